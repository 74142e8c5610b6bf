//! Decoder for Draco-compressed triangle meshes (`KHR_draco_mesh_compression`).
//!
//! Natively the sequential encoding is decoded here: raw or rANS-coded
//! indices, generic, integer, quantized and octahedral-normal attributes with
//! delta prediction. Edgebreaker-coded meshes report `Unsupported`. The web
//! build hands every mesh to the Draco decoder served next to the assets
//! (see [`web`]).

mod buffer;
mod octahedron;
mod symbols;
#[cfg(target_arch = "wasm32")]
pub mod web;

use thiserror::Error;

use buffer::DecoderBuffer;
use octahedron::Octahedron;
use symbols::{decode_symbols, to_signed};

const MAGIC: &[u8; 5] = b"DRACO";
const TRIANGULAR_MESH: u8 = 1;
const SEQUENTIAL: u8 = 0;
const EDGEBREAKER: u8 = 1;
const METADATA_FLAG: u16 = 0x8000;
const MAX_METADATA_DEPTH: u32 = 32;

// Sequential attribute decoder kinds.
const DECODER_GENERIC: u8 = 0;
const DECODER_INTEGER: u8 = 1;
const DECODER_QUANTIZATION: u8 = 2;
const DECODER_NORMALS: u8 = 3;

// Prediction methods and transforms.
const PREDICTION_NONE: i8 = -2;
const PREDICTION_DIFFERENCE: i8 = 0;
const TRANSFORM_WRAP: i8 = 1;
const TRANSFORM_OCTAHEDRON: i8 = 2;
const TRANSFORM_OCTAHEDRON_CANONICALIZED: i8 = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DracoError {
    #[error("not a Draco bitstream")]
    NotDraco,

    #[error("unsupported Draco bitstream version {0}.{1}")]
    Version(u8, u8),

    #[error("unsupported Draco feature: {0}")]
    Unsupported(String),

    #[error("truncated Draco bitstream")]
    Truncated,

    #[error("malformed Draco bitstream: {0}")]
    Malformed(&'static str),

    #[error("Draco decoder failed: {0}")]
    Decoder(String),
}

pub type DracoResult<T> = Result<T, DracoError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeKind {
    Position,
    Normal,
    Color,
    TexCoord,
    Generic,
}

impl AttributeKind {
    fn from_u8(value: u8) -> DracoResult<Self> {
        Ok(match value {
            0 => Self::Position,
            1 => Self::Normal,
            2 => Self::Color,
            3 => Self::TexCoord,
            4 => Self::Generic,
            _ => return Err(DracoError::Malformed("unknown attribute type")),
        })
    }
}

/// Storage type of an attribute before conversion to floats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DataType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
}

impl DataType {
    fn from_u8(value: u8) -> DracoResult<Self> {
        Ok(match value {
            1 => Self::I8,
            2 => Self::U8,
            3 => Self::I16,
            4 => Self::U16,
            5 => Self::I32,
            6 => Self::U32,
            7 => Self::I64,
            8 => Self::U64,
            9 => Self::F32,
            10 => Self::F64,
            11 => Self::Bool,
            _ => return Err(DracoError::Malformed("unknown data type")),
        })
    }

    fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 | Self::Bool => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    /// Magnitude an integer maps to 1.0 from when the attribute is normalized.
    fn normalization(self) -> f32 {
        match self {
            Self::I8 => f32::from(i8::MAX),
            Self::U8 => f32::from(u8::MAX),
            Self::I16 => f32::from(i16::MAX),
            Self::U16 => f32::from(u16::MAX),
            Self::I32 => i32::MAX as f32,
            Self::U32 => u32::MAX as f32,
            Self::I64 => i64::MAX as f32,
            Self::U64 => u64::MAX as f32,
            Self::F32 | Self::F64 | Self::Bool => 1.0,
        }
    }

    fn read(self, bytes: &[u8]) -> f32 {
        let mut wide = [0u8; 8];
        wide[..bytes.len()].copy_from_slice(bytes);
        match self {
            Self::I8 => f32::from(bytes[0] as i8),
            Self::U8 | Self::Bool => f32::from(bytes[0]),
            Self::I16 => f32::from(i16::from_le_bytes([bytes[0], bytes[1]])),
            Self::U16 => f32::from(u16::from_le_bytes([bytes[0], bytes[1]])),
            Self::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::U32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::I64 => i64::from_le_bytes(wide) as f32,
            Self::U64 => u64::from_le_bytes(wide) as f32,
            Self::F64 => f64::from_le_bytes(wide) as f32,
        }
    }
}

/// One decoded attribute, one value per point, converted to floats.
#[derive(Clone, Debug, PartialEq)]
pub struct DracoAttribute {
    pub unique_id: u32,
    pub kind: AttributeKind,
    pub components: usize,
    pub values: Vec<f32>,
}

impl DracoAttribute {
    pub fn value(&self, point: usize) -> &[f32] {
        &self.values[point * self.components..(point + 1) * self.components]
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DracoMesh {
    pub num_points: usize,
    pub indices: Vec<u32>,
    pub attributes: Vec<DracoAttribute>,
}

impl DracoMesh {
    /// Attribute by the id glTF's extension object refers to.
    pub fn attribute(&self, unique_id: u32) -> Option<&DracoAttribute> {
        self.attributes.iter().find(|a| a.unique_id == unique_id)
    }

    /// Values of a glTF attribute as fixed-size arrays; `None` if it is missing
    /// or has a different component count.
    pub fn read<const N: usize>(&self, unique_id: u32) -> Option<Vec<[f32; N]>> {
        let attribute = self.attribute(unique_id).filter(|a| a.components == N)?;
        Some(
            attribute
                .values
                .chunks_exact(N)
                .map(|chunk| {
                    let mut out = [0.0; N];
                    out.copy_from_slice(chunk);
                    out
                })
                .collect(),
        )
    }
}

/// Decodes a Draco mesh bitstream.
pub fn decode_mesh(data: &[u8]) -> DracoResult<DracoMesh> {
    let mut buffer = DecoderBuffer::new(data);
    if buffer.bytes(MAGIC.len()).map_err(|_| DracoError::NotDraco)? != MAGIC {
        return Err(DracoError::NotDraco);
    }
    let major = buffer.u8()?;
    let minor = buffer.u8()?;
    if major != 2 || minor > 2 {
        return Err(DracoError::Version(major, minor));
    }
    buffer.set_version(major, minor);

    if buffer.u8()? != TRIANGULAR_MESH {
        return Err(DracoError::Unsupported("point clouds".to_string()));
    }
    let method = buffer.u8()?;
    let flags = buffer.u16()?;
    if flags & METADATA_FLAG != 0 {
        skip_geometry_metadata(&mut buffer)?;
    }

    match method {
        SEQUENTIAL => {}
        EDGEBREAKER => {
            return Err(DracoError::Unsupported(
                "edgebreaker connectivity (decoded by the web build only)".to_string(),
            ));
        }
        _ => return Err(DracoError::Malformed("unknown encoder method")),
    }

    let (num_points, indices) = decode_sequential_connectivity(&mut buffer)?;
    let attributes = decode_sequential_attributes(&mut buffer, num_points)?;
    Ok(DracoMesh {
        num_points,
        indices,
        attributes,
    })
}

fn skip_geometry_metadata(buffer: &mut DecoderBuffer<'_>) -> DracoResult<()> {
    let attribute_metadata = buffer.varint_u32()?;
    for _ in 0..attribute_metadata {
        buffer.varint()?;
        skip_metadata(buffer, 0)?;
    }
    skip_metadata(buffer, 0)
}

fn skip_metadata(buffer: &mut DecoderBuffer<'_>, depth: u32) -> DracoResult<()> {
    if depth > MAX_METADATA_DEPTH {
        return Err(DracoError::Malformed("metadata nested too deeply"));
    }
    let entries = buffer.varint_u32()?;
    for _ in 0..entries {
        let key_len = buffer.u8()?;
        buffer.bytes(usize::from(key_len))?;
        let value_len = buffer.varint_u32()?;
        buffer.bytes(value_len as usize)?;
    }
    let children = buffer.varint_u32()?;
    for _ in 0..children {
        let name_len = buffer.u8()?;
        buffer.bytes(usize::from(name_len))?;
        skip_metadata(buffer, depth + 1)?;
    }
    Ok(())
}

fn decode_sequential_connectivity(buffer: &mut DecoderBuffer<'_>) -> DracoResult<(usize, Vec<u32>)> {
    let (num_faces, num_points) = if buffer.version_at_least(2, 2) {
        (buffer.varint_u32()?, buffer.varint_u32()?)
    } else {
        (buffer.u32()?, buffer.u32()?)
    };
    let num_indices = (num_faces as usize)
        .checked_mul(3)
        .ok_or(DracoError::Malformed("face count overflow"))?;
    if num_faces == 0 || num_points == 0 {
        return Ok((num_points as usize, Vec::new()));
    }

    let indices = match buffer.u8()? {
        0 => {
            let encoded = decode_symbols(buffer, num_indices, 1)?;
            let mut last = 0i32;
            encoded
                .into_iter()
                .map(|value| {
                    let magnitude = (value >> 1) as i32;
                    let diff = if value & 1 != 0 { -magnitude } else { magnitude };
                    last = last.wrapping_add(diff);
                    last as u32
                })
                .collect::<Vec<_>>()
        }
        1 => {
            let mut indices = Vec::with_capacity(num_indices);
            for _ in 0..num_indices {
                let index = if num_points < 1 << 8 {
                    u32::from(buffer.u8()?)
                } else if num_points < 1 << 16 {
                    u32::from(buffer.u16()?)
                } else if num_points < 1 << 21 && buffer.version_at_least(2, 2) {
                    buffer.varint_u32()?
                } else {
                    buffer.u32()?
                };
                indices.push(index);
            }
            indices
        }
        _ => return Err(DracoError::Malformed("unknown connectivity method")),
    };

    if indices.iter().any(|&i| i >= num_points) {
        return Err(DracoError::Malformed("index past point count"));
    }
    Ok((num_points as usize, indices))
}

/// Header of one attribute inside an attributes decoder.
struct AttributeHeader {
    kind: AttributeKind,
    data_type: DataType,
    components: usize,
    normalized: bool,
    unique_id: u32,
}

/// Attribute values as decoded, before transform data is applied.
enum Portable {
    Float(Vec<f32>),
    Integer(Vec<i32>),
}

fn decode_sequential_attributes(buffer: &mut DecoderBuffer<'_>, num_points: usize) -> DracoResult<Vec<DracoAttribute>> {
    let num_decoders = buffer.u8()?;

    // Decoder headers come first, then every decoder's payload in order.
    let mut decoders = Vec::with_capacity(usize::from(num_decoders));
    for _ in 0..num_decoders {
        let count = buffer.varint_u32()?;
        if count == 0 {
            return Err(DracoError::Malformed("attribute decoder without attributes"));
        }
        let mut headers = Vec::new();
        for _ in 0..count {
            let kind = AttributeKind::from_u8(buffer.u8()?)?;
            let data_type = DataType::from_u8(buffer.u8()?)?;
            let components = usize::from(buffer.u8()?);
            if components == 0 {
                return Err(DracoError::Malformed("attribute without components"));
            }
            let normalized = buffer.u8()? != 0;
            let unique_id = buffer.varint_u32()?;
            headers.push(AttributeHeader {
                kind,
                data_type,
                components,
                normalized,
                unique_id,
            });
        }
        let kinds = headers
            .iter()
            .map(|_| buffer.u8())
            .collect::<DracoResult<Vec<u8>>>()?;
        decoders.push((headers, kinds));
    }

    let mut attributes = Vec::new();
    for (headers, kinds) in decoders {
        let portables = headers
            .iter()
            .zip(&kinds)
            .map(|(header, &kind)| decode_portable(buffer, header, kind, num_points))
            .collect::<DracoResult<Vec<_>>>()?;

        for ((header, &kind), portable) in headers.iter().zip(&kinds).zip(portables) {
            let values = match portable {
                Portable::Float(values) => values,
                Portable::Integer(values) => finish_integer(buffer, header, kind, values)?,
            };
            let components = if kind == DECODER_NORMALS { 3 } else { header.components };
            attributes.push(DracoAttribute {
                unique_id: header.unique_id,
                kind: header.kind,
                components,
                values,
            });
        }
    }
    Ok(attributes)
}

fn decode_portable(
    buffer: &mut DecoderBuffer<'_>,
    header: &AttributeHeader,
    kind: u8,
    num_points: usize,
) -> DracoResult<Portable> {
    match kind {
        DECODER_GENERIC => {
            let stride = header.data_type.size();
            let raw = buffer.bytes(num_points * header.components * stride)?;
            let scale = if header.normalized {
                header.data_type.normalization()
            } else {
                1.0
            };
            Ok(Portable::Float(
                raw.chunks_exact(stride)
                    .map(|value| header.data_type.read(value) / scale)
                    .collect(),
            ))
        }
        DECODER_INTEGER | DECODER_QUANTIZATION | DECODER_NORMALS => {
            if kind != DECODER_INTEGER && header.data_type != DataType::F32 {
                return Err(DracoError::Malformed("quantized attribute must be float"));
            }
            if kind == DECODER_NORMALS && header.components != 3 {
                return Err(DracoError::Malformed("normals must have three components"));
            }
            let components = if kind == DECODER_NORMALS { 2 } else { header.components };
            let values = decode_integer_values(buffer, num_points * components, components, kind)?;
            Ok(Portable::Integer(values))
        }
        other => Err(DracoError::Unsupported(format!("attribute decoder {other}"))),
    }
}

/// Delta prediction with its transform, read ahead of the values.
enum Prediction {
    None,
    Wrap,
    Octahedron { canonicalized: bool },
}

fn decode_integer_values(
    buffer: &mut DecoderBuffer<'_>,
    num_values: usize,
    components: usize,
    kind: u8,
) -> DracoResult<Vec<i32>> {
    let method = buffer.i8()?;
    let prediction = if method == PREDICTION_NONE {
        Prediction::None
    } else {
        let transform = buffer.i8()?;
        if method != PREDICTION_DIFFERENCE {
            return Err(DracoError::Unsupported(format!(
                "mesh prediction scheme {method} without edgebreaker"
            )));
        }
        match (kind, transform) {
            (DECODER_NORMALS, TRANSFORM_OCTAHEDRON) => Prediction::Octahedron { canonicalized: false },
            (DECODER_NORMALS, TRANSFORM_OCTAHEDRON_CANONICALIZED) => Prediction::Octahedron { canonicalized: true },
            (DECODER_INTEGER | DECODER_QUANTIZATION, TRANSFORM_WRAP) => Prediction::Wrap,
            _ => return Err(DracoError::Unsupported(format!("prediction transform {transform}"))),
        }
    };

    let raw = if buffer.u8()? != 0 {
        decode_symbols(buffer, num_values, components)?
    } else {
        let width = usize::from(buffer.u8()?);
        if width == 0 || width > 4 {
            return Err(DracoError::Malformed("raw integer width out of range"));
        }
        let bytes = buffer.bytes(num_values * width)?;
        bytes
            .chunks_exact(width)
            .map(|chunk| {
                let mut wide = [0u8; 4];
                wide[..width].copy_from_slice(chunk);
                u32::from_le_bytes(wide)
            })
            .collect()
    };

    // Octahedral corrections are stored non-negative.
    let mut values: Vec<i32> = match prediction {
        Prediction::Octahedron { .. } => raw.into_iter().map(|v| v as i32).collect(),
        _ => raw.into_iter().map(to_signed).collect(),
    };

    match prediction {
        Prediction::None => {}
        Prediction::Wrap => {
            let min = buffer.i32()?;
            let max = buffer.i32()?;
            undo_wrapped_delta(&mut values, components, min, max)?;
        }
        Prediction::Octahedron { canonicalized } => {
            let max_quantized = buffer.i32()?;
            // The center is implied by the bound; newer plain streams omit it.
            if canonicalized || !buffer.version_at_least(2, 2) {
                buffer.i32()?;
            }
            let octahedron = Octahedron::from_max_quantized(max_quantized)?;
            // The first entry is predicted from zero.
            let mut previous = [0, 0];
            for chunk in values.chunks_exact_mut(2) {
                let original = octahedron.apply_correction(previous, [chunk[0], chunk[1]], canonicalized);
                chunk.copy_from_slice(&original);
                previous = original;
            }
        }
    }
    Ok(values)
}

fn undo_wrapped_delta(values: &mut [i32], components: usize, min: i32, max: i32) -> DracoResult<()> {
    let span = i64::from(max) - i64::from(min);
    if span < 0 || span >= i64::from(i32::MAX) {
        return Err(DracoError::Malformed("wrap bounds out of range"));
    }
    let max_dif = (span + 1) as i32;

    let mut predicted = vec![0i32; components];
    for entry in values.chunks_exact_mut(components) {
        for (value, prediction) in entry.iter_mut().zip(predicted.iter_mut()) {
            let base = (*prediction).clamp(min, max);
            let mut original = base.wrapping_add(*value);
            if original > max {
                original -= max_dif;
            } else if original < min {
                original += max_dif;
            }
            *value = original;
            *prediction = original;
        }
    }
    Ok(())
}

/// Reads the transform data stored after every payload and converts the
/// integers to their original float values.
fn finish_integer(buffer: &mut DecoderBuffer<'_>, header: &AttributeHeader, kind: u8, values: Vec<i32>) -> DracoResult<Vec<f32>> {
    match kind {
        DECODER_QUANTIZATION => {
            let min = (0..header.components)
                .map(|_| buffer.f32())
                .collect::<DracoResult<Vec<f32>>>()?;
            let range = buffer.f32()?;
            let bits = buffer.u8()?;
            if !(1..=30).contains(&bits) {
                return Err(DracoError::Malformed("quantization bits out of range"));
            }
            let delta = range / ((1u32 << bits) - 1) as f32;
            Ok(values
                .iter()
                .enumerate()
                .map(|(i, &q)| q as f32 * delta + min[i % header.components])
                .collect())
        }
        DECODER_NORMALS => {
            let bits = buffer.u8()?;
            let octahedron = Octahedron::from_bits(bits)?;
            Ok(values
                .chunks_exact(2)
                .flat_map(|st| octahedron.to_unit_vector(st[0], st[1]))
                .collect())
        }
        _ => {
            let scale = if header.normalized {
                header.data_type.normalization()
            } else {
                1.0
            };
            Ok(values.iter().map(|&v| v as f32 / scale).collect())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests;
