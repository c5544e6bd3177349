//! On-disk buffer archives.
//!
//! Ground-truth buffers are stored as a compressed-sparse-row matrix of the
//! flattened `[16, 7, 256, 256]` array: four named tensors `data` (f32),
//! `indices`/`indptr` (i64) and `shape` (i64 pair). Raw predictions and
//! low-resolution intermediates are stored densely under a single `raw`
//! entry. Both use the safetensors container.

use crate::{ARCHIVE_FRAMES, ARCHIVE_RESOLUTION, BASE_CHANNELS, XrayBuffer};
use burn::prelude::Backend;
use burn::tensor::{Tensor, TensorData};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error while reading buffer archive.")]
    Io(#[from] std::io::Error),

    #[error("Malformed buffer archive: {0}")]
    Malformed(#[from] safetensors::SafeTensorError),

    #[error("Archive entry `{name}` has dtype {found:?}, expected {expected:?}")]
    WrongDtype {
        name: &'static str,
        found: Dtype,
        expected: Dtype,
    },

    #[error(
        "Archive shape {rows}x{cols} is incompatible with \
         {ARCHIVE_FRAMES}x{BASE_CHANNELS}x{ARCHIVE_RESOLUTION}x{ARCHIVE_RESOLUTION}"
    )]
    ShapeMismatch { rows: usize, cols: usize },

    #[error("Sparse index data is inconsistent.")]
    InvalidSparseIndex,

    #[error("Dense archive entry `raw` must be 4 dimensional, got {0} dims")]
    InvalidRank(usize),

    #[error("Could not read tensor data back from the device.")]
    Readback,
}

fn f32_entry(archive: &SafeTensors, name: &'static str) -> Result<Vec<f32>, ArchiveError> {
    let view = archive.tensor(name)?;
    if view.dtype() != Dtype::F32 {
        return Err(ArchiveError::WrongDtype {
            name,
            found: view.dtype(),
            expected: Dtype::F32,
        });
    }
    // The mmapped byte slice has no alignment guarantee.
    Ok(bytemuck::pod_collect_to_vec(view.data()))
}

fn i64_entry(archive: &SafeTensors, name: &'static str) -> Result<Vec<i64>, ArchiveError> {
    let view = archive.tensor(name)?;
    if view.dtype() != Dtype::I64 {
        return Err(ArchiveError::WrongDtype {
            name,
            found: view.dtype(),
            expected: Dtype::I64,
        });
    }
    Ok(bytemuck::pod_collect_to_vec(view.data()))
}

/// Decode a sparse buffer archive into a dense `[16, 7, 256, 256]` buffer.
///
/// Malformed or truncated archives fail the whole sample; there is no
/// partial-recovery path.
pub fn read_sparse<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<XrayBuffer<B>, ArchiveError> {
    let bytes = std::fs::read(path)?;
    let archive = SafeTensors::deserialize(&bytes)?;

    let data = f32_entry(&archive, "data")?;
    let indices = i64_entry(&archive, "indices")?;
    let indptr = i64_entry(&archive, "indptr")?;
    let shape = i64_entry(&archive, "shape")?;

    let [rows, cols] = shape.as_slice() else {
        return Err(ArchiveError::InvalidSparseIndex);
    };
    let (rows, cols) = (*rows as usize, *cols as usize);

    let total = ARCHIVE_FRAMES * BASE_CHANNELS * ARCHIVE_RESOLUTION * ARCHIVE_RESOLUTION;
    if rows * cols != total {
        return Err(ArchiveError::ShapeMismatch { rows, cols });
    }
    if indptr.len() != rows + 1 || indices.len() != data.len() {
        return Err(ArchiveError::InvalidSparseIndex);
    }

    let mut dense = vec![0f32; total];
    for row in 0..rows {
        let start = indptr[row];
        let end = indptr[row + 1];
        if start < 0 || end < start || end as usize > data.len() {
            return Err(ArchiveError::InvalidSparseIndex);
        }
        for k in start as usize..end as usize {
            let col = indices[k];
            if col < 0 || col as usize >= cols {
                return Err(ArchiveError::InvalidSparseIndex);
            }
            dense[row * cols + col as usize] = data[k];
        }
    }

    let tensor = Tensor::from_data(
        TensorData::new(
            dense,
            [
                ARCHIVE_FRAMES,
                BASE_CHANNELS,
                ARCHIVE_RESOLUTION,
                ARCHIVE_RESOLUTION,
            ],
        ),
        device,
    );
    Ok(XrayBuffer::from_tensor(tensor))
}

/// Encode a dense buffer as a sparse archive. Inverse of [`read_sparse`].
pub fn write_sparse<B: Backend>(path: &Path, buffer: &XrayBuffer<B>) -> Result<(), ArchiveError> {
    let [frames, channels, height, width] = buffer.dims();
    let dense: Vec<f32> = buffer
        .inner()
        .clone()
        .into_data()
        .into_vec()
        .map_err(|_| ArchiveError::Readback)?;

    // Row per scanline of the flattened matrix, like the source encoder.
    let rows = frames * channels * height;
    let cols = width;

    let mut data = Vec::new();
    let mut indices: Vec<i64> = Vec::new();
    let mut indptr: Vec<i64> = Vec::with_capacity(rows + 1);
    indptr.push(0);
    for row in 0..rows {
        for col in 0..cols {
            let value = dense[row * cols + col];
            if value != 0.0 {
                data.push(value);
                indices.push(col as i64);
            }
        }
        indptr.push(data.len() as i64);
    }
    let shape: Vec<i64> = vec![rows as i64, cols as i64];

    let views = vec![
        (
            "data",
            TensorView::new(Dtype::F32, vec![data.len()], bytemuck::cast_slice(&data))?,
        ),
        (
            "indices",
            TensorView::new(
                Dtype::I64,
                vec![indices.len()],
                bytemuck::cast_slice(&indices),
            )?,
        ),
        (
            "indptr",
            TensorView::new(
                Dtype::I64,
                vec![indptr.len()],
                bytemuck::cast_slice(&indptr),
            )?,
        ),
        (
            "shape",
            TensorView::new(Dtype::I64, vec![2], bytemuck::cast_slice(&shape))?,
        ),
    ];
    let bytes = safetensors::serialize(views, None)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

/// Read a dense 4d tensor (raw prediction or low-res intermediate).
pub fn read_dense<B: Backend>(path: &Path, device: &B::Device) -> Result<Tensor<B, 4>, ArchiveError> {
    let bytes = std::fs::read(path)?;
    let archive = SafeTensors::deserialize(&bytes)?;
    let view = archive.tensor("raw")?;
    if view.dtype() != Dtype::F32 {
        return Err(ArchiveError::WrongDtype {
            name: "raw",
            found: view.dtype(),
            expected: Dtype::F32,
        });
    }
    let shape = view.shape().to_vec();
    let [f, c, h, w] = shape.as_slice() else {
        return Err(ArchiveError::InvalidRank(view.shape().len()));
    };
    let values: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
    Ok(Tensor::from_data(
        TensorData::new(values, [*f, *c, *h, *w]),
        device,
    ))
}

/// Write a dense 4d tensor under the `raw` entry.
pub fn write_dense<B: Backend>(path: &Path, tensor: Tensor<B, 4>) -> Result<(), ArchiveError> {
    let shape = tensor.dims().to_vec();
    let values: Vec<f32> = tensor
        .into_data()
        .into_vec()
        .map_err(|_| ArchiveError::Readback)?;
    let views = vec![(
        "raw",
        TensorView::new(Dtype::F32, shape, bytemuck::cast_slice(&values))?,
    )];
    let bytes = safetensors::serialize(views, None)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::{Rng, SeedableRng, rngs::StdRng};
    use std::path::PathBuf;

    type TestBackend = NdArray;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("xray-archive-{}-{name}", std::process::id()))
    }

    fn roundtrip(dense: Vec<f32>) {
        let device = Default::default();
        let tensor = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(
                dense.clone(),
                [
                    ARCHIVE_FRAMES,
                    BASE_CHANNELS,
                    ARCHIVE_RESOLUTION,
                    ARCHIVE_RESOLUTION,
                ],
            ),
            &device,
        );
        let path = temp_path("roundtrip");
        write_sparse(&path, &XrayBuffer::from_tensor(tensor)).expect("write failed");
        let restored = read_sparse::<TestBackend>(&path, &device).expect("read failed");
        let restored: Vec<f32> = restored
            .into_inner()
            .into_data()
            .into_vec()
            .expect("readback failed");
        assert_eq!(restored, dense, "decode must invert encode exactly");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn sparse_roundtrip_zeros() {
        let total = ARCHIVE_FRAMES * BASE_CHANNELS * ARCHIVE_RESOLUTION * ARCHIVE_RESOLUTION;
        roundtrip(vec![0.0; total]);
    }

    #[test]
    fn sparse_roundtrip_ones() {
        let total = ARCHIVE_FRAMES * BASE_CHANNELS * ARCHIVE_RESOLUTION * ARCHIVE_RESOLUTION;
        roundtrip(vec![1.0; total]);
    }

    #[test]
    fn sparse_roundtrip_random_sparse() {
        let total = ARCHIVE_FRAMES * BASE_CHANNELS * ARCHIVE_RESOLUTION * ARCHIVE_RESOLUTION;
        let mut rng = StdRng::seed_from_u64(42);
        let dense: Vec<f32> = (0..total)
            .map(|_| {
                if rng.random_bool(0.05) {
                    rng.random_range(0.1..2.0)
                } else {
                    0.0
                }
            })
            .collect();
        roundtrip(dense);
    }

    #[test]
    fn rejects_incompatible_shape() {
        let path = temp_path("bad-shape");
        let data: Vec<f32> = vec![];
        let indices: Vec<i64> = vec![];
        let indptr: Vec<i64> = vec![0; 17];
        let shape: Vec<i64> = vec![16, 16];
        let views = vec![
            (
                "data",
                TensorView::new(Dtype::F32, vec![0], bytemuck::cast_slice(&data)).expect("view"),
            ),
            (
                "indices",
                TensorView::new(Dtype::I64, vec![0], bytemuck::cast_slice(&indices))
                    .expect("view"),
            ),
            (
                "indptr",
                TensorView::new(Dtype::I64, vec![17], bytemuck::cast_slice(&indptr))
                    .expect("view"),
            ),
            (
                "shape",
                TensorView::new(Dtype::I64, vec![2], bytemuck::cast_slice(&shape)).expect("view"),
            ),
        ];
        std::fs::write(&path, safetensors::serialize(views, None).expect("serialize"))
            .expect("write");

        let device = Default::default();
        let result = read_sparse::<TestBackend>(&path, &device);
        assert!(
            matches!(result, Err(ArchiveError::ShapeMismatch { .. })),
            "expected shape rejection"
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn truncated_archive_is_fatal() {
        let path = temp_path("truncated");
        std::fs::write(&path, [0u8; 16]).expect("write");
        let device = Default::default();
        assert!(
            read_sparse::<TestBackend>(&path, &device).is_err(),
            "truncated archive must fail to decode"
        );
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn dense_roundtrip() {
        let device = Default::default();
        let values: Vec<f32> = (0..2 * 8 * 4 * 4).map(|v| v as f32 * 0.25).collect();
        let tensor = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(values.clone(), [2, 8, 4, 4]),
            &device,
        );
        let path = temp_path("dense");
        write_dense(&path, tensor).expect("write failed");
        let restored = read_dense::<TestBackend>(&path, &device).expect("read failed");
        assert_eq!(restored.dims(), [2, 8, 4, 4]);
        let restored: Vec<f32> = restored.into_data().into_vec().expect("readback");
        assert_eq!(restored, values);
        let _ = std::fs::remove_file(&path);
    }
}
