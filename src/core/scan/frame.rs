use std::time::Duration;

use image::{imageops, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::error::ScanError;

/// 相机物理方向（EXIF 1/6/3/8 子集）
///
/// 表示存储的像素需要如何旋转才能正向显示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    Up,
    /// 需顺时针旋转 90°，竖屏后置摄像头的常见值
    Right,
    Down,
    Left,
}

impl Orientation {
    pub fn from_exif(value: u32) -> Option<Self> {
        match value {
            1 => Some(Orientation::Up),
            6 => Some(Orientation::Right),
            3 => Some(Orientation::Down),
            8 => Some(Orientation::Left),
            _ => None,
        }
    }

    /// Image extent after orientation correction.
    pub fn extent(&self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Orientation::Up | Orientation::Down => (width, height),
            Orientation::Right | Orientation::Left => (height, width),
        }
    }

    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        match self {
            Orientation::Up => image.clone(),
            Orientation::Right => imageops::rotate90(image),
            Orientation::Down => imageops::rotate180(image),
            Orientation::Left => imageops::rotate270(image),
        }
    }
}

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA 格式
    pub orientation: Orientation,
    pub timestamp: Duration,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            orientation: Orientation::Up,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    /// 只有 Y 平面时直接展开成灰度 RGBA
    pub fn from_luma(
        width: u32,
        height: u32,
        y_plane: &[u8],
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        let data = y_plane.iter().flat_map(|&y| [y, y, y, 255]).collect();
        Self::new(width, height, data, timestamp_ms, frame_number)
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn oriented_extent(&self) -> (u32, u32) {
        self.orientation.extent(self.width, self.height)
    }

    /// 方向校正后的图像
    pub fn oriented_image(&self) -> Result<RgbaImage, ScanError> {
        let raw = RgbaImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            ScanError::InvalidFrame(format!(
                "frame {}: {} bytes for {}x{} RGBA",
                self.frame_number,
                self.data.len(),
                self.width,
                self.height
            ))
        })?;

        Ok(match self.orientation {
            Orientation::Up => raw,
            other => other.apply(&raw),
        })
    }
}

/// 从原生层传递的原始帧数据（YUV420 planar）
#[derive(Debug)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub y_plane: Vec<u8>,
    pub u_plane: Vec<u8>,
    pub v_plane: Vec<u8>,
    pub orientation: Orientation,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

impl RawFrame {
    pub fn to_frame(&self) -> Result<Frame, ScanError> {
        let w = self.width as usize;
        let h = self.height as usize;
        let chroma_w = w.div_ceil(2);
        let chroma_len = chroma_w * h.div_ceil(2);

        if w == 0
            || h == 0
            || self.y_plane.len() < w * h
            || self.u_plane.len() < chroma_len
            || self.v_plane.len() < chroma_len
        {
            return Err(ScanError::InvalidFrame(format!(
                "frame {}: YUV planes do not fit {}x{}",
                self.frame_number, self.width, self.height
            )));
        }

        let mut rgba_data = vec![0u8; w * h * 4];

        rgba_data
            .par_chunks_mut(w * 4)
            .enumerate()
            .for_each(|(y, row)| {
                let uv_row = (y / 2) * chroma_w;
                for x in 0..w {
                    let uv_idx = uv_row + x / 2;

                    let y_val = self.y_plane[y * w + x] as f32;
                    let u_val = self.u_plane[uv_idx] as f32 - 128.0;
                    let v_val = self.v_plane[uv_idx] as f32 - 128.0;

                    let px = &mut row[x * 4..x * 4 + 4];
                    px[0] = (y_val + 1.402 * v_val).clamp(0.0, 255.0) as u8;
                    px[1] = (y_val - 0.344136 * u_val - 0.714136 * v_val).clamp(0.0, 255.0) as u8;
                    px[2] = (y_val + 1.772 * u_val).clamp(0.0, 255.0) as u8;
                    px[3] = 255;
                }
            });

        Ok(Frame::new(
            self.width,
            self.height,
            rgba_data,
            self.timestamp_ms,
            self.frame_number,
        )
        .with_orientation(self.orientation))
    }
}
