/// Subject masks and instance detection
///
/// A masker produces a soft foreground map at model resolution. The
/// map is thresholded into connected foreground instances; all
/// detected instances are merged into a single mask scaled to the
/// input resolution before compositing.
use image::imageops::FilterType;
use image::{GrayImage, RgbaImage};

use super::VisionError;

/// Pixels at or above this foreground probability count as subject.
pub const FOREGROUND_THRESHOLD: f32 = 0.5;

/// Soft foreground map (0.0 = background, 1.0 = subject) at the
/// masker's native resolution.
#[derive(Debug, Clone)]
pub struct SubjectMask {
    pub data: Vec<f32>,
    pub width: u32,
    pub height: u32,
}

impl SubjectMask {
    pub fn value_at(&self, x: u32, y: u32) -> f32 {
        let idx = (y.min(self.height - 1) * self.width + x.min(self.width - 1)) as usize;
        self.data.get(idx).copied().unwrap_or(0.0)
    }
}

/// Turns a normalized still image into a subject mask.
pub trait SubjectMasker: Send {
    fn generate_mask(&mut self, image: &RgbaImage) -> Result<SubjectMask, VisionError>;
}

/// One detected foreground instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskInstance {
    pub label: u32,
    pub area: usize,
}

/// Per-pixel instance labels over a thresholded mask. Label 0 is
/// background.
pub struct InstanceMap {
    labels: Vec<u32>,
    width: u32,
    height: u32,
    instances: Vec<MaskInstance>,
}

impl InstanceMap {
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instances(&self) -> &[MaskInstance] {
        &self.instances
    }

    /// Merge every detected instance into one grayscale mask, keeping
    /// the soft foreground values inside instances and zero elsewhere.
    pub fn merged_mask(&self, mask: &SubjectMask) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let idx = (y * self.width + x) as usize;
            if self.labels[idx] != 0 {
                let soft = mask.value_at(x, y).clamp(0.0, 1.0);
                image::Luma([(soft * 255.0).round() as u8])
            } else {
                image::Luma([0])
            }
        })
    }
}

/// Label 4-connected foreground components of a thresholded mask.
pub fn label_instances(mask: &SubjectMask, threshold: f32) -> InstanceMap {
    let width = mask.width;
    let height = mask.height;
    let mut labels = vec![0u32; (width * height) as usize];
    let mut instances = Vec::new();
    let mut next_label = 1u32;

    let mut queue = std::collections::VecDeque::new();
    for start in 0..labels.len() {
        if labels[start] != 0 || mask.data[start] < threshold {
            continue;
        }

        // Flood fill a new component
        let label = next_label;
        next_label += 1;
        let mut area = 0usize;

        labels[start] = label;
        queue.push_back(start);
        while let Some(idx) = queue.pop_front() {
            area += 1;
            let x = (idx as u32) % width;
            let y = (idx as u32) / width;

            let mut visit = |nx: u32, ny: u32| {
                let nidx = (ny * width + nx) as usize;
                if labels[nidx] == 0 && mask.data[nidx] >= threshold {
                    labels[nidx] = label;
                    queue.push_back(nidx);
                }
            };

            if x > 0 {
                visit(x - 1, y);
            }
            if x + 1 < width {
                visit(x + 1, y);
            }
            if y > 0 {
                visit(x, y - 1);
            }
            if y + 1 < height {
                visit(x, y + 1);
            }
        }

        instances.push(MaskInstance { label, area });
    }

    InstanceMap {
        labels,
        width,
        height,
        instances,
    }
}

/// Scale a merged mask up (or down) to the input image's resolution.
pub fn scale_mask_to(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    if mask.width() == width && mask.height() == height {
        return mask.clone();
    }
    image::imageops::resize(mask, width, height, FilterType::Triangle)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Masker returning a scripted mask, for pipeline tests.
    pub struct StubMasker {
        pub mask: SubjectMask,
        pub fail: bool,
    }

    impl StubMasker {
        /// Mask with a filled rectangle of foreground.
        pub fn with_rect(
            width: u32,
            height: u32,
            x0: u32,
            y0: u32,
            x1: u32,
            y1: u32,
        ) -> Self {
            let mut data = vec![0.0f32; (width * height) as usize];
            for y in y0..y1 {
                for x in x0..x1 {
                    data[(y * width + x) as usize] = 1.0;
                }
            }
            StubMasker {
                mask: SubjectMask {
                    data,
                    width,
                    height,
                },
                fail: false,
            }
        }

        pub fn empty(width: u32, height: u32) -> Self {
            StubMasker {
                mask: SubjectMask {
                    data: vec![0.0f32; (width * height) as usize],
                    width,
                    height,
                },
                fail: false,
            }
        }
    }

    impl SubjectMasker for StubMasker {
        fn generate_mask(&mut self, _image: &RgbaImage) -> Result<SubjectMask, VisionError> {
            if self.fail {
                return Err(VisionError::RequestFailed(String::from("stubbed failure")));
            }
            Ok(self.mask.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(data: Vec<f32>, width: u32, height: u32) -> SubjectMask {
        SubjectMask {
            data,
            width,
            height,
        }
    }

    #[test]
    fn test_empty_mask_has_no_instances() {
        let mask = mask_from(vec![0.0; 16], 4, 4);
        let map = label_instances(&mask, FOREGROUND_THRESHOLD);
        assert!(map.is_empty());
    }

    #[test]
    fn test_single_blob_is_one_instance() {
        #[rustfmt::skip]
        let data = vec![
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.9, 0.8, 0.0,
            0.0, 0.7, 0.9, 0.0,
            0.0, 0.0, 0.0, 0.0,
        ];
        let mask = mask_from(data, 4, 4);
        let map = label_instances(&mask, FOREGROUND_THRESHOLD);
        assert_eq!(map.instance_count(), 1);
        assert_eq!(map.instances()[0].area, 4);
    }

    #[test]
    fn test_disjoint_blobs_are_separate_instances() {
        #[rustfmt::skip]
        let data = vec![
            0.9, 0.0, 0.0, 0.9,
            0.9, 0.0, 0.0, 0.9,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 0.0,
        ];
        let mask = mask_from(data, 4, 4);
        let map = label_instances(&mask, FOREGROUND_THRESHOLD);
        assert_eq!(map.instance_count(), 2);

        // Merging keeps both blobs
        let merged = map.merged_mask(&mask);
        assert!(merged.get_pixel(0, 0).0[0] > 200);
        assert!(merged.get_pixel(3, 1).0[0] > 200);
        assert_eq!(merged.get_pixel(1, 1).0[0], 0);
    }

    #[test]
    fn test_threshold_excludes_weak_pixels() {
        let data = vec![0.4, 0.49, 0.5, 0.6];
        let mask = mask_from(data, 4, 1);
        let map = label_instances(&mask, FOREGROUND_THRESHOLD);
        // 0.5 and 0.6 are adjacent, one component of two pixels
        assert_eq!(map.instance_count(), 1);
        assert_eq!(map.instances()[0].area, 2);
    }

    #[test]
    fn test_scale_mask_matches_target() {
        let mask = GrayImage::from_pixel(4, 4, image::Luma([255]));
        let scaled = scale_mask_to(&mask, 32, 24);
        assert_eq!(scaled.dimensions(), (32, 24));
    }
}
