//! GDS-II stream writer.
//!
//! [GdsWriter] is a [LayoutSink]: [Library::emit] drives it through the
//! hierarchy and it turns every module into one structure (BGNSTR .. ENDSTR),
//! rectangles into BOUNDARY elements, labels into TEXT elements and
//! placements into SREF elements.
//!
//! ## GDS-II Record Structure
//! Each record: [2-byte length][2-byte record type][payload]

use std::io::{self, Write};
use thiserror::Error;

use cellweave_core::{
    Instance, Label, LayoutError, LayoutSink, Library, Mirror, Module, ModuleKey, Point, Rect,
};

// ── GDS-II Record Types ──────────────────────────────────────────────

mod record_type {
    pub const HEADER: u16 = 0x0002;
    pub const BGNLIB: u16 = 0x0102;
    pub const LIBNAME: u16 = 0x0206;
    pub const UNITS: u16 = 0x0305;
    pub const ENDLIB: u16 = 0x0400;
    pub const BGNSTR: u16 = 0x0502;
    pub const STRNAME: u16 = 0x0606;
    pub const ENDSTR: u16 = 0x0700;
    pub const BOUNDARY: u16 = 0x0800;
    pub const SREF: u16 = 0x0A00;
    pub const TEXT: u16 = 0x0C00;
    pub const LAYER: u16 = 0x0D02;
    pub const DATATYPE: u16 = 0x0E02;
    pub const XY: u16 = 0x1003;
    pub const ENDEL: u16 = 0x1100;
    pub const SNAME: u16 = 0x1206;
    pub const TEXTTYPE: u16 = 0x1602;
    pub const STRING: u16 = 0x1906;
    pub const STRANS: u16 = 0x1A01;
    pub const ANGLE: u16 = 0x1C05;
}

/// STRANS flag for reflection about the x axis, applied before rotation.
const STRANS_REFLECT: u16 = 0x8000;

/// Modification and access time written for every library and structure.
/// Fixed so identical layouts produce identical streams.
const TIMESTAMP: [i16; 12] = [2000, 1, 1, 0, 0, 0, 2000, 1, 1, 0, 0, 0];

// ── Errors ────────────────────────────────────────────────────────────

pub type GdsResult<T> = Result<T, GdsError>;

#[derive(Error, Debug)]
pub enum GdsError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("record 0x{record_type:04X} payload of {len} bytes does not fit in a GDS-II record")]
    RecordTooLong { record_type: u16, len: usize },

    #[error("layer/datatype number {0} is outside the GDS-II range")]
    NumberOutOfRange(u32),

    #[error("coordinate {0} um does not fit in a 32-bit database unit")]
    CoordinateOutOfRange(f64),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

// ── GDS-II Writer ─────────────────────────────────────────────────────

pub struct GdsWriter<W: Write> {
    writer: W,
    db_unit_in_um: f64,
    structures: usize,
}

impl<W: Write> GdsWriter<W> {
    /// A writer with a 1 nm database unit.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            db_unit_in_um: 0.001,
            structures: 0,
        }
    }

    pub fn with_db_unit(mut self, db_unit_in_um: f64) -> Self {
        self.db_unit_in_um = db_unit_in_um;
        self
    }

    /// Write the stream header up to and including UNITS.
    pub fn begin_library(&mut self, name: &str) -> GdsResult<()> {
        self.write_i16_record(record_type::HEADER, &[600])?; // GDS version 6
        self.write_i16_record(record_type::BGNLIB, &TIMESTAMP)?;
        self.write_string_record(record_type::LIBNAME, name)?;
        // db unit in user units (um), db unit in meters
        let units = [self.db_unit_in_um, self.db_unit_in_um * 1e-6];
        self.write_real8_record(record_type::UNITS, &units)
    }

    /// Write ENDLIB and hand back the underlying writer.
    pub fn finish(mut self) -> GdsResult<W> {
        self.write_record(record_type::ENDLIB, &[])?;
        self.writer.flush()?;
        log::info!("wrote {} GDS-II structures", self.structures);
        Ok(self.writer)
    }

    fn write_record(&mut self, record_type: u16, data: &[u8]) -> GdsResult<()> {
        let total_len = u16::try_from(data.len() + 4).map_err(|_| GdsError::RecordTooLong {
            record_type,
            len: data.len(),
        })?;
        self.writer.write_all(&total_len.to_be_bytes())?;
        self.writer.write_all(&record_type.to_be_bytes())?;
        if !data.is_empty() {
            self.writer.write_all(data)?;
        }
        Ok(())
    }

    fn write_i16_record(&mut self, record_type: u16, values: &[i16]) -> GdsResult<()> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(record_type, &data)
    }

    fn write_i32_record(&mut self, record_type: u16, values: &[i32]) -> GdsResult<()> {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        self.write_record(record_type, &data)
    }

    fn write_string_record(&mut self, record_type: u16, s: &str) -> GdsResult<()> {
        let mut data: Vec<u8> = s.bytes().collect();
        // GDS strings must be even length
        if data.len() % 2 != 0 {
            data.push(0);
        }
        self.write_record(record_type, &data)
    }

    fn write_real8_record(&mut self, record_type: u16, values: &[f64]) -> GdsResult<()> {
        let data: Vec<u8> = values.iter().flat_map(|v| f64_to_gds_real8(*v)).collect();
        self.write_record(record_type, &data)
    }

    fn write_layer(&mut self, record_type: u16, number: u32) -> GdsResult<()> {
        let value = i16::try_from(number).map_err(|_| GdsError::NumberOutOfRange(number))?;
        self.write_i16_record(record_type, &[value])
    }

    fn to_db(&self, value: f64) -> GdsResult<i32> {
        let scaled = (value / self.db_unit_in_um).round();
        if scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
            return Err(GdsError::CoordinateOutOfRange(value));
        }
        Ok(scaled as i32)
    }

    fn write_xy(&mut self, points: &[Point]) -> GdsResult<()> {
        let mut coords = Vec::with_capacity(points.len() * 2);
        for p in points {
            coords.push(self.to_db(p.x)?);
            coords.push(self.to_db(p.y)?);
        }
        self.write_i32_record(record_type::XY, &coords)
    }
}

/// STRANS flags and angle (degrees) realizing `mirror` followed by a
/// counter-clockwise rotation of `degrees`.
///
/// GDS-II only reflects about the x axis, so MY is a reflection turned by
/// 180 degrees and XY a plain 180 degree turn.
fn strans(mirror: Mirror, degrees: f64) -> (u16, f64) {
    let (reflect, base) = match mirror {
        Mirror::R0 => (false, 0.0),
        Mirror::MX => (true, 0.0),
        Mirror::MY => (true, 180.0),
        Mirror::XY => (false, 180.0),
    };
    let flags = if reflect { STRANS_REFLECT } else { 0 };
    (flags, (base + degrees).rem_euclid(360.0))
}

impl<W: Write> LayoutSink for GdsWriter<W> {
    type Error = GdsError;

    fn begin_module(&mut self, module: &Module) -> GdsResult<()> {
        self.write_i16_record(record_type::BGNSTR, &TIMESTAMP)?;
        self.write_string_record(record_type::STRNAME, module.name())
    }

    fn emit_instance(&mut self, instance: &Instance, definition: &Module) -> GdsResult<()> {
        self.write_record(record_type::SREF, &[])?;
        self.write_string_record(record_type::SNAME, definition.name())?;

        let (flags, angle) = strans(instance.mirror(), instance.rotation().degrees());
        if flags != 0 || angle != 0.0 {
            self.write_record(record_type::STRANS, &flags.to_be_bytes())?;
        }
        if angle != 0.0 {
            self.write_real8_record(record_type::ANGLE, &[angle])?;
        }

        self.write_xy(&[instance.offset()])?;
        self.write_record(record_type::ENDEL, &[])
    }

    fn emit_rect(&mut self, rect: &Rect) -> GdsResult<()> {
        let (ll, ur) = (rect.lower_left, rect.upper_right);
        self.write_record(record_type::BOUNDARY, &[])?;
        self.write_layer(record_type::LAYER, rect.layer)?;
        self.write_layer(record_type::DATATYPE, rect.purpose)?;
        // 5 points: closed rectangle
        self.write_xy(&[
            ll,
            Point::new(ur.x, ll.y),
            ur,
            Point::new(ll.x, ur.y),
            ll,
        ])?;
        self.write_record(record_type::ENDEL, &[])
    }

    fn emit_label(&mut self, label: &Label) -> GdsResult<()> {
        self.write_record(record_type::TEXT, &[])?;
        self.write_layer(record_type::LAYER, label.layer)?;
        self.write_layer(record_type::TEXTTYPE, label.purpose)?;
        self.write_xy(&[label.position])?;
        self.write_string_record(record_type::STRING, &label.text)?;
        self.write_record(record_type::ENDEL, &[])
    }

    fn end_module(&mut self, _module: &Module) -> GdsResult<()> {
        self.structures += 1;
        self.write_record(record_type::ENDSTR, &[])
    }
}

/// Write `top` and every module below it as a complete GDS-II library.
pub fn write_library<W: Write>(lib: &Library, top: ModuleKey, writer: W) -> GdsResult<W> {
    let mut gds = GdsWriter::new(writer);
    gds.begin_library(&lib.name)?;
    lib.emit(top, &mut gds)?;
    gds.finish()
}

/// Convert IEEE 754 f64 to GDS-II excess-64 real format.
fn f64_to_gds_real8(value: f64) -> [u8; 8] {
    if value == 0.0 {
        return [0u8; 8];
    }

    let sign_bit: u8 = if value < 0.0 { 0x80 } else { 0x00 };
    let mut val = value.abs();

    // Find exponent such that 1/16 <= mantissa < 1
    let mut exponent: i32 = 0;
    while val >= 1.0 && exponent < 63 {
        val /= 16.0;
        exponent += 1;
    }
    while val < 1.0 / 16.0 && exponent > -64 {
        val *= 16.0;
        exponent -= 1;
    }

    let mantissa = (val * (1u64 << 56) as f64) as u64;
    let mut result = mantissa.to_be_bytes();
    result[0] = sign_bit | ((exponent + 64) as u8 & 0x7F);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellweave_core::{LayerTable, ModuleKind, Rotation};

    /// Convert GDS-II excess-64 real format to IEEE 754 f64.
    fn gds_real8_to_f64(bytes: &[u8]) -> f64 {
        if bytes.iter().all(|&b| b == 0) {
            return 0.0;
        }
        let sign = if bytes[0] & 0x80 != 0 { -1.0 } else { 1.0 };
        let exponent = (bytes[0] & 0x7F) as i32 - 64;
        let mantissa = bytes[1..].iter().fold(0u64, |m, &b| (m << 8) | b as u64);
        sign * (mantissa as f64 / (1u64 << 56) as f64) * 16.0_f64.powi(exponent)
    }

    /// Split a stream into (record type, payload) pairs.
    fn records(stream: &[u8]) -> Vec<(u16, Vec<u8>)> {
        let mut out = Vec::new();
        let mut at = 0;
        while at < stream.len() {
            let len = u16::from_be_bytes([stream[at], stream[at + 1]]) as usize;
            let kind = u16::from_be_bytes([stream[at + 2], stream[at + 3]]);
            out.push((kind, stream[at + 4..at + len].to_vec()));
            at += len;
        }
        out
    }

    fn as_i32(data: &[u8]) -> Vec<i32> {
        data.chunks_exact(4)
            .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }

    fn as_string(data: &[u8]) -> String {
        String::from_utf8_lossy(data).trim_end_matches('\0').to_string()
    }

    #[test]
    fn test_gds_real8_roundtrip() {
        let values = [0.0, 1.0, -1.0, 0.001, 1e-9, 3.14159, 180.0, 1000.0];
        for &v in &values {
            let result = gds_real8_to_f64(&f64_to_gds_real8(v));
            assert!(
                (result - v).abs() < v.abs() * 1e-10 + 1e-15,
                "Roundtrip failed for {}: got {}",
                v,
                result
            );
        }
    }

    #[test]
    fn test_strans_mapping() {
        assert_eq!(strans(Mirror::R0, 0.0), (0, 0.0));
        assert_eq!(strans(Mirror::MX, 90.0), (STRANS_REFLECT, 90.0));
        assert_eq!(strans(Mirror::MY, 0.0), (STRANS_REFLECT, 180.0));
        assert_eq!(strans(Mirror::XY, 270.0), (0, 90.0));
    }

    #[test]
    fn test_write_hierarchy() {
        let mut lib = Library::new(
            "stream",
            LayerTable::new().with_layer("metal1", 68, 20).with_layer("text", 68, 5),
            0.005,
        );
        let m1 = lib.layer("metal1").unwrap();
        let text = lib.layer("text").unwrap();

        let mut leaf = lib.new_module("leaf", ModuleKind::new("leaf"));
        leaf.add_rect(&m1, Point::new(0.0, 0.0), 1.0, 0.5);
        leaf.set_size(1.0, 0.5);
        let leaf = lib.add_module(leaf).unwrap();

        let mut top = lib.new_module("top", ModuleKind::new("top"));
        top.add_instance(&lib, "a", leaf, Point::new(2.0, 0.0), Mirror::MY, Rotation::R0)
            .unwrap();
        top.add_instance(&lib, "b", leaf, Point::new(0.0, 3.0), Mirror::R0, Rotation::R0)
            .unwrap();
        top.add_label("vdd", &text, Point::new(0.5, 0.25));
        let top = lib.add_module(top).unwrap();

        let stream = write_library(&lib, top, Vec::new()).unwrap();
        let recs = records(&stream);
        let kinds: Vec<u16> = recs.iter().map(|(k, _)| *k).collect();

        use record_type::*;
        assert_eq!(&kinds[..4], &[HEADER, BGNLIB, LIBNAME, UNITS]);
        assert_eq!(as_string(&recs[2].1), "stream");
        assert_eq!(kinds.last(), Some(&ENDLIB));
        assert_eq!(kinds.iter().filter(|&&k| k == BGNSTR).count(), 2);
        assert_eq!(kinds.iter().filter(|&&k| k == SREF).count(), 2);

        let names: Vec<String> = recs
            .iter()
            .filter(|(k, _)| *k == STRNAME)
            .map(|(_, d)| as_string(d))
            .collect();
        assert_eq!(names, vec!["leaf", "top"]);

        let boundary_xy = recs
            .iter()
            .skip_while(|(k, _)| *k != BOUNDARY)
            .find(|(k, _)| *k == XY)
            .map(|(_, d)| as_i32(d))
            .unwrap();
        assert_eq!(boundary_xy, vec![0, 0, 1000, 0, 1000, 500, 0, 500, 0, 0]);

        // The mirrored placement carries a reflection and a half turn.
        let strans_at = kinds.iter().position(|&k| k == STRANS).unwrap();
        assert_eq!(recs[strans_at].1, STRANS_REFLECT.to_be_bytes().to_vec());
        assert_eq!(kinds[strans_at + 1], ANGLE);
        assert!((gds_real8_to_f64(&recs[strans_at + 1].1) - 180.0).abs() < 1e-9);
        assert_eq!(as_i32(&recs[strans_at + 2].1), vec![2000, 0]);
        // The unmirrored one has neither.
        assert_eq!(kinds.iter().filter(|&&k| k == STRANS).count(), 1);

        let label = recs.iter().position(|(k, _)| *k == STRING).unwrap();
        assert_eq!(as_string(&recs[label].1), "vdd");
    }

    #[test]
    fn test_unit_scaling_and_range() {
        let mut gds = GdsWriter::new(Vec::new()).with_db_unit(0.005);
        assert_eq!(gds.to_db(1.0).unwrap(), 200);
        assert_eq!(gds.to_db(0.0149999).unwrap(), 3);
        assert!(matches!(gds.to_db(1e9), Err(GdsError::CoordinateOutOfRange(_))));
        assert!(matches!(
            gds.write_layer(record_type::LAYER, 70_000),
            Err(GdsError::NumberOutOfRange(70_000))
        ));
    }
}
