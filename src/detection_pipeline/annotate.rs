//! Box overlay for display snapshots

use crate::models::VehicleObservation;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const TARGET_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const VEHICLE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LINE_WIDTH: u32 = 2;

/// Copy of `image` with one box per observation
pub fn annotate(image: &RgbImage, observations: &[VehicleObservation]) -> RgbImage {
    let mut canvas = image.clone();

    for obs in observations {
        let color = if obs.is_target {
            TARGET_COLOR
        } else {
            VEHICLE_COLOR
        };

        // Nested rects give a visible line on 1280x720 frames
        for inset in 0..LINE_WIDTH {
            let width = obs.bbox.width().saturating_sub(inset * 2);
            let height = obs.bbox.height().saturating_sub(inset * 2);
            if width == 0 || height == 0 {
                break;
            }
            let rect = Rect::at(obs.bbox.x1 + inset as i32, obs.bbox.y1 + inset as i32)
                .of_size(width, height);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }
    }

    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BBox;

    fn observation(bbox: BBox, is_target: bool) -> VehicleObservation {
        VehicleObservation {
            bbox,
            confidence: 0.9,
            class_label: "car".to_string(),
            is_target,
        }
    }

    #[test]
    fn test_target_box_is_red() {
        let image = RgbImage::new(40, 40);
        let out = annotate(&image, &[observation(BBox::new(5, 5, 25, 25), true)]);

        assert_eq!(*out.get_pixel(5, 5), TARGET_COLOR);
        assert_eq!(*out.get_pixel(15, 15), Rgb([0, 0, 0]));
        // Source frame untouched
        assert_eq!(*image.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_vehicle_box_is_green() {
        let image = RgbImage::new(40, 40);
        let out = annotate(&image, &[observation(BBox::new(10, 10, 30, 20), false)]);
        assert_eq!(*out.get_pixel(10, 10), VEHICLE_COLOR);
    }
}
