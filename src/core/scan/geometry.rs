//! 区域几何 - 字符框合并与坐标系转换
//!
//! 检测器输出的坐标是归一化的，原点在左下角；图像缓冲区的原点在左上角。
//! 所有翻转和缩放都集中在这里的自由函数中。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// 单个字符的四角框（归一化，左下原点）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharacterBox {
    pub top_left: Point,
    pub top_right: Point,
    pub bottom_left: Point,
    pub bottom_right: Point,
}

impl CharacterBox {
    /// Axis-aligned box from its normalized edges.
    pub fn from_edges(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            top_left: Point::new(min_x, max_y),
            top_right: Point::new(max_x, max_y),
            bottom_left: Point::new(min_x, min_y),
            bottom_right: Point::new(max_x, min_y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRect {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl NormalizedRect {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Ordered edges, all inside [0, 1].
    pub fn is_normalized(&self) -> bool {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        in_unit(self.min_x)
            && in_unit(self.min_y)
            && in_unit(self.max_x)
            && in_unit(self.max_y)
            && self.min_x <= self.max_x
            && self.min_y <= self.max_y
    }
}

/// 一次检测周期中的文字区域
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRegion {
    pub bounds: NormalizedRect,
    pub character_boxes: Vec<CharacterBox>,
}

impl TextRegion {
    pub fn new(bounds: NormalizedRect, character_boxes: Vec<CharacterBox>) -> Self {
        Self {
            bounds,
            character_boxes,
        }
    }
}

/// 字符框的并集（归一化，左下原点）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnionBox {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

/// 像素坐标矩形，原点仍在左下角
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// 叠加层用的归一化矩形，原点在左上角
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// 实际裁剪用的整数矩形，原点在左上角，已裁到图像范围内
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Union of all character boxes; `None` when the region has none.
pub fn union_box(boxes: &[CharacterBox]) -> Option<UnionBox> {
    let first = boxes.first()?;
    let seed = UnionBox {
        x_min: first.bottom_left.x,
        x_max: first.bottom_right.x,
        y_min: first.bottom_right.y,
        y_max: first.top_right.y,
    };

    Some(boxes[1..].iter().fold(seed, |acc, b| UnionBox {
        x_min: acc.x_min.min(b.bottom_left.x),
        x_max: acc.x_max.max(b.bottom_right.x),
        y_min: acc.y_min.min(b.bottom_right.y),
        y_max: acc.y_max.max(b.top_right.y),
    }))
}

/// Scale a union box to the orientation-corrected image extent.
pub fn to_pixel_rect(union: &UnionBox, extent: (u32, u32)) -> PixelRect {
    let (w, h) = (extent.0 as f32, extent.1 as f32);
    PixelRect {
        x: union.x_min * w,
        y: union.y_min * h,
        width: (union.x_max - union.x_min) * w,
        height: (union.y_max - union.y_min) * h,
    }
}

pub fn to_display_rect(union: &UnionBox) -> DisplayRect {
    DisplayRect {
        x: union.x_min,
        y: 1.0 - union.y_max,
        width: union.x_max - union.x_min,
        height: union.y_max - union.y_min,
    }
}

/// 左下原点的像素矩形 → 左上原点的整数裁剪框
///
/// 向外取整后裁到图像内；退化矩形或与图像不相交时返回 `None`。
pub fn to_crop_rect(rect: &PixelRect, extent: (u32, u32)) -> Option<CropRect> {
    let (w, h) = (extent.0 as f32, extent.1 as f32);

    let finite = [rect.x, rect.y, rect.width, rect.height]
        .iter()
        .all(|v| v.is_finite());
    if !finite || rect.width <= 0.0 || rect.height <= 0.0 {
        return None;
    }

    let left = rect.x.floor().max(0.0);
    let right = (rect.x + rect.width).ceil().min(w);
    let bottom = rect.y.floor().max(0.0);
    let top = (rect.y + rect.height).ceil().min(h);

    if right <= left || top <= bottom {
        return None;
    }

    Some(CropRect {
        x: left as u32,
        y: (h - top) as u32,
        width: (right - left) as u32,
        height: (top - bottom) as u32,
    })
}
