use super::symbols::tests::raw_zeros;
use super::*;

/// Little helper for hand-assembling bitstreams.
pub(crate) struct Stream(pub Vec<u8>);

impl Stream {
    pub fn header(method: u8, flags: u16) -> Self {
        let mut stream = Self(MAGIC.to_vec());
        stream.0.extend_from_slice(&[2, 2, TRIANGULAR_MESH, method]);
        stream.0.extend_from_slice(&flags.to_le_bytes());
        stream
    }

    pub fn u8(mut self, values: &[u8]) -> Self {
        self.0.extend_from_slice(values);
        self
    }

    pub fn u16(mut self, values: &[u16]) -> Self {
        values.iter().for_each(|v| self.0.extend_from_slice(&v.to_le_bytes()));
        self
    }

    pub fn i32(mut self, values: &[i32]) -> Self {
        values.iter().for_each(|v| self.0.extend_from_slice(&v.to_le_bytes()));
        self
    }

    pub fn f32(mut self, values: &[f32]) -> Self {
        values.iter().for_each(|v| self.0.extend_from_slice(&v.to_le_bytes()));
        self
    }
}

/// Attribute header: type, data type, components, normalized, unique id.
fn attribute(kind: u8, components: u8, unique_id: u8) -> [u8; 5] {
    [kind, 9, components, 0, unique_id]
}

const TRIANGLE_POSITIONS: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

/// One triangle with float positions, quantized texcoords (wrapped delta
/// prediction) and octahedral normals, sequentially encoded.
pub(crate) fn triangle(flags: u16, metadata: &[u8]) -> Vec<u8> {
    Stream::header(SEQUENTIAL, flags)
        .u8(metadata)
        // 1 face, 3 points, raw u8 indices.
        .u8(&[1, 3, 1, 0, 1, 2])
        // One attributes decoder holding three attributes.
        .u8(&[1, 3])
        .u8(&attribute(0, 3, 0))
        .u8(&attribute(3, 2, 1))
        .u8(&attribute(1, 3, 2))
        .u8(&[DECODER_GENERIC, DECODER_QUANTIZATION, DECODER_NORMALS])
        // Positions as raw floats.
        .f32(&TRIANGLE_POSITIONS)
        // Texcoords: delta + wrap, raw 1-byte zig-zag corrections 0,0 3,0 1,3.
        // The last x wraps: 3 + 1 = 4 -> 0.
        .u8(&[PREDICTION_DIFFERENCE as u8, TRANSFORM_WRAP as u8, 0, 1])
        .u8(&[0, 0, 6, 0, 2, 6])
        .i32(&[0, 3])
        // Normals: no prediction, raw 2-byte zig-zag (127, 254) per point.
        .u8(&[PREDICTION_NONE as u8, 0, 2])
        .u16(&[254, 508, 254, 508, 254, 508])
        // Quantization: min (0, 0), range 1, 2 bits.
        .f32(&[0.0, 0.0, 1.0])
        .u8(&[2])
        // Octahedral normals at 8 bits.
        .u8(&[8])
        .0
}

/// Header of an edgebreaker-coded mesh with no payload.
pub(crate) fn edgebreaker_header() -> Vec<u8> {
    Stream::header(EDGEBREAKER, 0).0
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-5, "{actual:?} != {expected:?}");
    }
}

#[test]
fn decodes_sequential_triangle() {
    let mesh = decode_mesh(&triangle(0, &[])).unwrap();
    assert_eq!(mesh.num_points, 3);
    assert_eq!(mesh.indices, vec![0, 1, 2]);

    let positions = mesh.attribute(0).unwrap();
    assert_eq!(positions.kind, AttributeKind::Position);
    assert_eq!(positions.values, TRIANGLE_POSITIONS.to_vec());

    let uvs = mesh.attribute(1).unwrap();
    assert_eq!(uvs.kind, AttributeKind::TexCoord);
    assert_close(&uvs.values, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);

    let normals = mesh.read::<3>(2).unwrap();
    for n in normals {
        assert_close(&n, &[0.0, 0.0, 1.0]);
    }
    assert!(mesh.read::<2>(2).is_none());
    assert!(mesh.attribute(7).is_none());
}

#[test]
fn metadata_is_skipped() {
    // No attribute metadata; one file entry "foo" = "hi"; no children.
    let metadata = [0, 1, 3, b'f', b'o', b'o', 2, b'h', b'i', 0];
    let mesh = decode_mesh(&triangle(METADATA_FLAG, &metadata)).unwrap();
    assert_eq!(mesh.indices, vec![0, 1, 2]);
}

#[test]
fn entropy_coded_indices() {
    let bytes = Stream::header(SEQUENTIAL, 0)
        .u8(&[1, 3, 0])
        .u8(&raw_zeros())
        .u8(&[1, 1])
        .u8(&attribute(0, 3, 0))
        .u8(&[DECODER_GENERIC])
        .f32(&TRIANGLE_POSITIONS)
        .0;
    let mesh = decode_mesh(&bytes).unwrap();
    // All deltas are zero, so every corner points at vertex 0.
    assert_eq!(mesh.indices, vec![0, 0, 0]);
    assert_eq!(mesh.attribute(0).unwrap().value(1), &[1.0, 0.0, 0.0]);
}

#[test]
fn indices_must_reference_points() {
    let bytes = Stream::header(SEQUENTIAL, 0).u8(&[1, 3, 1, 0, 1, 3]).0;
    assert_eq!(decode_mesh(&bytes), Err(DracoError::Malformed("index past point count")));
}

#[test]
fn rejects_other_inputs() {
    assert_eq!(decode_mesh(b"glTF\x02\0\0\0"), Err(DracoError::NotDraco));
    assert_eq!(decode_mesh(b"DRA"), Err(DracoError::NotDraco));

    let mut future = triangle(0, &[]);
    future[5] = 3;
    assert_eq!(decode_mesh(&future), Err(DracoError::Version(3, 2)));

    assert!(matches!(decode_mesh(&edgebreaker_header()), Err(DracoError::Unsupported(_))));

    let truncated = triangle(0, &[]);
    assert_eq!(decode_mesh(&truncated[..truncated.len() - 1]), Err(DracoError::Truncated));
}
