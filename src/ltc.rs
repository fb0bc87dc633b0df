//! Linearly-transformed-cosine lookup tables for area lights.
//!
//! The tables ship as raw little-endian `f32` files: `ltc_mat.bin` holds
//! the 32x32 four-channel inverse-matrix table and `ltc_mag.bin` the
//! 32x32 two-channel magnitude/fresnel table. A converter from the
//! comma-separated text dumps the tables are published as is included, so
//! regenerating the binaries is a one-liner.

use std::path::Path;

use crate::buffer::ColorBuffer;
use crate::error::{RenderError, Result};
use crate::gpu::GpuContext;

/// Edge length of both lookup tables.
pub const LTC_SIZE: usize = 32;

/// Floats per texel of the inverse-matrix table.
pub const LTC_MAT_CHANNELS: usize = 4;

/// Floats per texel of the magnitude table.
pub const LTC_MAG_CHANNELS: usize = 2;

const MAT_FLOATS: usize = LTC_SIZE * LTC_SIZE * LTC_MAT_CHANNELS;
const MAG_FLOATS: usize = LTC_SIZE * LTC_SIZE * LTC_MAG_CHANNELS;

/// CPU-side copy of both lookup tables.
#[derive(Debug)]
pub struct LtcTables {
    pub mat: Vec<f32>,
    pub mag: Vec<f32>,
}

impl LtcTables {
    /// Decode the tables from their binary file contents.
    pub fn from_binary(mat: &[u8], mag: &[u8]) -> Result<Self> {
        Ok(Self {
            mat: floats_from_bytes(mat, "ltc_mat.bin", MAT_FLOATS)?,
            mag: floats_from_bytes(mag, "ltc_mag.bin", MAG_FLOATS)?,
        })
    }

    /// Load `ltc_mat.bin` and `ltc_mag.bin` from a directory.
    pub fn load(dir: &Path) -> Result<Self> {
        let mat = std::fs::read(dir.join("ltc_mat.bin"))?;
        let mag = std::fs::read(dir.join("ltc_mag.bin"))?;
        Self::from_binary(&mat, &mag)
    }

    /// Decode the tables from the published comma-separated text dumps.
    pub fn from_text(mat: &str, mag: &str) -> Result<Self> {
        Ok(Self {
            mat: parse_float_table(mat, "ltc_mat.bin", MAT_FLOATS)?,
            mag: parse_float_table(mag, "ltc_mag.bin", MAG_FLOATS)?,
        })
    }

    /// Serialize a table back to its binary form.
    pub fn mat_bytes(&self) -> Vec<u8> {
        floats_to_bytes(&self.mat)
    }

    pub fn mag_bytes(&self) -> Vec<u8> {
        floats_to_bytes(&self.mag)
    }

    /// Upload both tables as textures for area-light shading.
    pub fn upload(&self, gpu: &GpuContext) -> LtcTextures {
        let size = LTC_SIZE as u32;
        let mat = ColorBuffer::new(
            gpu,
            size,
            size,
            wgpu::TextureFormat::Rgba32Float,
            1,
            "LTC Matrix Table",
        );
        mat.upload(gpu, &self.mat_bytes(), (LTC_MAT_CHANNELS * 4) as u32);
        let mag = ColorBuffer::new(
            gpu,
            size,
            size,
            wgpu::TextureFormat::Rg32Float,
            1,
            "LTC Magnitude Table",
        );
        mag.upload(gpu, &self.mag_bytes(), (LTC_MAG_CHANNELS * 4) as u32);
        LtcTextures { mat, mag }
    }
}

/// The uploaded lookup tables, bound as `ltcMat` and `ltcMag`.
pub struct LtcTextures {
    pub mat: ColorBuffer,
    pub mag: ColorBuffer,
}

fn floats_from_bytes(bytes: &[u8], name: &'static str, expected: usize) -> Result<Vec<f32>> {
    if bytes.len() != expected * 4 {
        return Err(RenderError::BadLtcTable {
            name,
            got: bytes.len(),
            expected: expected * 4,
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        out.extend_from_slice(&f.to_le_bytes());
    }
    out
}

/// Parse a comma-separated float dump, whitespace tolerated.
fn parse_float_table(text: &str, name: &'static str, expected: usize) -> Result<Vec<f32>> {
    let floats: Vec<f32> = text
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()?;
    if floats.len() != expected {
        return Err(RenderError::BadLtcTable {
            name,
            got: floats.len() * 4,
            expected: expected * 4,
        });
    }
    Ok(floats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32 * 0.25 - 3.0).collect()
    }

    #[test]
    fn binary_round_trip_is_bit_exact() {
        let tables = LtcTables {
            mat: ramp(MAT_FLOATS),
            mag: ramp(MAG_FLOATS),
        };
        let reloaded = LtcTables::from_binary(&tables.mat_bytes(), &tables.mag_bytes()).unwrap();
        assert_eq!(tables.mat, reloaded.mat);
        assert_eq!(tables.mag, reloaded.mag);
    }

    #[test]
    fn truncated_table_reports_both_lengths() {
        let err = LtcTables::from_binary(&[0u8; 16], &[0u8; MAG_FLOATS * 4]).unwrap_err();
        match err {
            RenderError::BadLtcTable {
                name,
                got,
                expected,
            } => {
                assert_eq!(name, "ltc_mat.bin");
                assert_eq!(got, 16);
                assert_eq!(expected, MAT_FLOATS * 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn text_dump_matches_binary_decode() {
        let floats = ramp(MAT_FLOATS);
        let text = floats
            .iter()
            .map(|f| format!("{f}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mag_text = ramp(MAG_FLOATS)
            .iter()
            .map(|f| format!("{f}"))
            .collect::<Vec<_>>()
            .join(",");
        let tables = LtcTables::from_text(&text, &mag_text).unwrap();
        assert_eq!(tables.mat, floats);
        // round through the binary form too
        let reloaded = LtcTables::from_binary(&tables.mat_bytes(), &tables.mag_bytes()).unwrap();
        assert_eq!(reloaded.mat, floats);
    }

    #[test]
    fn malformed_text_is_a_parse_error() {
        let err = parse_float_table("1.0, nope, 3.0", "ltc_mat.bin", 3).unwrap_err();
        assert!(matches!(err, RenderError::ParseFloat(_)));
    }

    #[test]
    fn load_reads_both_files_from_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let tables = LtcTables {
            mat: ramp(MAT_FLOATS),
            mag: ramp(MAG_FLOATS),
        };
        std::fs::write(dir.path().join("ltc_mat.bin"), tables.mat_bytes()).unwrap();
        std::fs::write(dir.path().join("ltc_mag.bin"), tables.mag_bytes()).unwrap();
        let loaded = LtcTables::load(dir.path()).unwrap();
        assert_eq!(loaded.mat, tables.mat);
        assert_eq!(loaded.mag, tables.mag);
    }
}
