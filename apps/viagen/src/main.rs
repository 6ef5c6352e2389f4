use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use cellweave_contact::{place_contact_center, ContactCache, ContactParams, ContactStyle};
use cellweave_core::{Library, ModuleKey, ModuleKind, Point, Rotation};
use cellweave_rules::{LayerClass, Technology};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Technology description (YAML or JSON).
    #[arg(short, long)]
    tech: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Summarize the technology's layers, rules and via stacks.
    Info,

    /// Build one contact and write it as a GDS-II library.
    Contact {
        /// Bottom conductor layer.
        #[arg(long)]
        bottom: String,
        /// Cut layer.
        #[arg(long)]
        cut: String,
        /// Top conductor layer.
        #[arg(long)]
        top: String,
        /// Cuts along x.
        #[arg(long, default_value_t = 1)]
        nx: u32,
        /// Cuts along y.
        #[arg(long, default_value_t = 1)]
        ny: u32,
        /// Implant around the bottom conductor (requires --well).
        #[arg(long)]
        implant: Option<String>,
        /// Well around the bottom conductor (requires --implant).
        #[arg(long)]
        well: Option<String>,
        /// Grow the conductors to their minimum area.
        #[arg(long)]
        fill: bool,
        /// Run the top conductor perpendicular to the bottom one.
        #[arg(long)]
        cross: bool,
        /// Output GDS-II file.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Build the 1x1 contact of every declared stack and place them in a row.
    Stacks {
        /// Name of the top-level structure.
        #[arg(long, default_value = "via_stacks")]
        name: String,
        /// Output GDS-II file.
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let tech = Technology::load(&args.tech)
        .with_context(|| format!("failed to load technology {}", args.tech.display()))?;

    match args.command {
        Command::Info => info(&tech),
        Command::Contact {
            bottom,
            cut,
            top,
            nx,
            ny,
            implant,
            well,
            fill,
            cross,
            output,
        } => {
            let mut params = ContactParams::new(&bottom, &cut, &top).array(nx, ny);
            params.implant = implant;
            params.well = well;
            params.area_fill = fill;
            if cross {
                params = params.with_style(ContactStyle::Cross);
            }
            contact(&tech, &params, &output)
        }
        Command::Stacks { name, output } => stacks(&tech, &name, &output),
    }
}

fn info(tech: &Technology) -> Result<()> {
    let rules = tech.rules();
    println!("Technology: {}", tech.name);
    println!("\tGrid: {} um", tech.grid);
    println!("\tLayers: {}", tech.layers.layer_count());
    println!("\tRules: {}", tech.rules.len());
    for layer in tech.layers.all_layers() {
        let presence = if layer.is_present() { "" } else { " (absent)" };
        let width = rules
            .min_width(&layer.name)
            .map(|w| format!("{w} um"))
            .unwrap_or_else(|_| "-".to_string());
        println!(
            "\t\t{:<12} {:>4}/{:<4} {:<8} min width {}{}",
            layer.name,
            layer.gds_layer,
            layer.gds_datatype,
            LayerClass::classify(&layer.name).to_string(),
            width,
            presence
        );
    }
    println!("\tVia stacks: {}", tech.stacks.len());
    for stack in &tech.stacks {
        println!("\t\t{stack}");
    }
    Ok(())
}

fn contact(tech: &Technology, params: &ContactParams, output: &Path) -> Result<()> {
    let mut lib = tech.library(&params.name());
    let mut cache = ContactCache::new();
    let key = cache
        .get_or_build(&mut lib, &tech.rules(), params)
        .with_context(|| format!("failed to build {params}"))?;
    let module = lib.module(key)?;
    println!("{}: {} x {} um", module.name(), module.width(), module.height());
    write_gds(&lib, key, output)
}

fn stacks(tech: &Technology, name: &str, output: &Path) -> Result<()> {
    let mut lib = tech.library(name);
    let mut cache = ContactCache::new();
    cache.prebuild(&mut lib, tech)?;
    log::debug!("placing {} contacts in '{name}'", cache.len());

    let mut row = lib.new_module(name, ModuleKind::new("array"));
    let mut x = 0.0;
    for (index, stack) in tech.stacks.iter().enumerate() {
        let params = ContactParams::from_stack(stack);
        let key = cache
            .get(&params)
            .with_context(|| format!("{params} was not prebuilt"))?;
        let width = lib.module(key)?.width();
        let spacing = tech.rules().min_width(&stack.bottom).unwrap_or(width);
        let center = Point::new(x + width / 2.0, 0.0);
        place_contact_center(&mut row, &lib, &format!("via{index}"), key, center, Rotation::R0)?;
        x += width + spacing;
    }
    row.offset_all_coordinates();
    row.size_to_fit();
    let top = lib.add_module(row)?;
    write_gds(&lib, top, output)
}

fn write_gds(lib: &Library, top: ModuleKey, output: &Path) -> Result<()> {
    let file = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    cellweave_io::write_library(lib, top, BufWriter::new(file))
        .with_context(|| format!("failed to write {}", output.display()))?;
    log::info!("wrote {} ({})", output.display(), lib.module(top)?.name());
    Ok(())
}
