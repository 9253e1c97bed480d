//! Merge-repair of multiple images of identical geometry (§4.5.4),
//! grounded on `imgtool.c`'s `merge_repair()`.

use crate::error::XdError;
use crate::image::{is_bad_block, DiskImage};

/// Merge N images of identical geometry into one, choosing the best
/// available block per LBA.
///
/// Selection priority per LBA:
///   1. Any image that read the block as good.
///   2. Otherwise any image whose error-table value isn't "bad"
///      (preserves a soft-error code rather than silently calling it
///      good).
///   3. Otherwise the first image's (bad) block, unchanged.
///
/// A block both-good-but-differing-content across two or more images is
/// "weak": the highest pairwise-agreement-scoring variant is kept, and
/// the merged error table is tagged with `weak_tag` for that block.
pub fn merge_repair(images: &[DiskImage], weak_tag: u8) -> Result<DiskImage, XdError> {
    if images.len() < 2 {
        return Err(XdError::MergeNeedsTwoImages);
    }
    let geometry = images[0].geometry;
    for img in &images[1..] {
        if img.geometry.disk_type != geometry.disk_type {
            return Err(XdError::MergeGeometryMismatch {
                a: format!("{:?}", geometry.disk_type),
                b: format!("{:?}", img.geometry.disk_type),
            });
        }
    }

    let mut merged = DiskImage::from_bytes(vec![0u8; geometry.blocks as usize * crate::image::BLOCK_SIZE])?;

    for lba in 0..geometry.blocks {
        let good: Vec<usize> = images
            .iter()
            .enumerate()
            .filter(|(_, img)| !is_bad_block(img.error(lba)))
            .map(|(i, _)| i)
            .collect();

        if good.len() >= 2 {
            let distinct_contents_agree = good
                .windows(2)
                .all(|w| images[w[0]].block(lba) == images[w[1]].block(lba));

            if distinct_contents_agree {
                merged.block_mut(lba).copy_from_slice(images[good[0]].block(lba));
                merged.set_error(lba, 1);
            } else {
                let best = score_weak_block(images, &good, lba);
                merged.block_mut(lba).copy_from_slice(images[best].block(lba));
                merged.set_error(lba, weak_tag);
            }
            continue;
        }

        if let Some(&i) = good.first() {
            merged.block_mut(lba).copy_from_slice(images[i].block(lba));
            merged.set_error(lba, 1);
            continue;
        }

        // No image read this block as good. Prefer one whose error
        // table preserves the original soft-error code over a hard
        // "bad" tag, else fall back to the first image verbatim.
        let soft = images
            .iter()
            .enumerate()
            .find(|(_, img)| !is_bad_block(img.error(lba)));
        if let Some((i, img)) = soft {
            merged.block_mut(lba).copy_from_slice(img.block(lba));
            merged.set_error(lba, img.error(lba));
        } else {
            merged.block_mut(lba).copy_from_slice(images[0].block(lba));
            merged.set_error(lba, images[0].error(lba));
        }
    }

    Ok(merged)
}

/// Score each candidate image's content for `lba` by how many pairwise
/// agreements it wins among the other candidates, and return the index
/// of the winner (ties keep the first / lowest-index candidate).
fn score_weak_block(images: &[DiskImage], candidates: &[usize], lba: u32) -> usize {
    let mut best = candidates[0];
    let mut best_score = -1i32;
    for &i in candidates {
        let score = candidates
            .iter()
            .filter(|&&j| j != i && images[i].block(lba) == images[j].block(lba))
            .count() as i32;
        if score > best_score {
            best_score = score;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::D64;
    use crate::image::BLOCK_SIZE;

    fn image_with_table(fill: u8, error_at_40: u8) -> DiskImage {
        let mut data = vec![fill; D64.blocks as usize * BLOCK_SIZE];
        let mut table = vec![1u8; D64.blocks as usize];
        table[40] = error_at_40;
        data.extend_from_slice(&table);
        DiskImage::from_bytes(data).unwrap()
    }

    #[test]
    fn scenario_s6_bad_vs_good_picks_good() {
        let a = image_with_table(0xaa, 5); // bad
        let b = image_with_table(0xbb, 1); // good
        let merged = merge_repair(&[a, b], 1).unwrap();
        assert_eq!(merged.block(40)[0], 0xbb);
        assert_eq!(merged.error(40), 1);
    }

    #[test]
    fn scenario_s6_both_good_but_differing_is_weak() {
        let a = image_with_table(0xaa, 1);
        let b = image_with_table(0xbb, 1);
        let merged = merge_repair(&[a, b], 1).unwrap();
        assert_eq!(merged.error(40), 1);

        let merged_ff = merge_repair(
            &[image_with_table(0xaa, 1), image_with_table(0xbb, 1)],
            0xFF,
        )
        .unwrap();
        assert_eq!(merged_ff.error(40), 0xFF);
    }

    #[test]
    fn requires_at_least_two_images() {
        let a = image_with_table(0xaa, 1);
        assert!(merge_repair(&[a], 1).is_err());
    }

    #[test]
    fn rejects_mismatched_geometry() {
        let d64 = DiskImage::from_bytes(vec![0u8; D64.blocks as usize * BLOCK_SIZE]).unwrap();
        let d81 = DiskImage::from_bytes(vec![
            0u8;
            crate::geometry::D81.blocks as usize * BLOCK_SIZE
        ])
        .unwrap();
        assert!(merge_repair(&[d64, d81], 1).is_err());
    }
}
