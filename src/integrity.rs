//! Integrity scanner (§4.5.3): forward link-chain walks for PRG/SEQ/USR
//! files, and REL side-sector verification grounded on the original
//! server's `append_ssg`/`process_relfile` (`relfiles.c`).

use crate::directory::DirEntry;
use crate::geometry::Geometry;
use crate::image::{is_bad_block, DiskImage};

const SSB_OFFSET_SECTOR_NUM: usize = 2;
const SSB_OFFSET_RECORD_LEN: usize = 3;
const SSB_OFFSET_SSG: usize = 4;
const SSB_OFFSET_SECTOR: usize = 16;
const SSG_SIDE_SECTORS_MAX: usize = 6;
const SSB_INDEX_SECTOR_MAX: usize = 120;
const SSB_OFFSET_SUPER_254: usize = 2;
const SSS_OFFSET_SSB_POINTER: usize = 3;
const SSS_INDEX_SSB_MAX: usize = 126;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanIssue {
    Warning(String),
    Error(String),
}

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub issues: Vec<ScanIssue>,
    pub data_blocks: Vec<u32>,
}

impl ScanReport {
    pub fn is_clean(&self) -> bool {
        self.issues.iter().all(|i| matches!(i, ScanIssue::Warning(_)))
    }
}

/// Walk the forward link chain of a PRG/SEQ/USR file starting at
/// `(track, sector)`. A block-count mismatch against the directory's
/// declared length is a warning, not an error (§4.5.3).
pub fn follow_link_chain(
    image: &DiskImage,
    entry: &DirEntry,
) -> ScanReport {
    let mut report = ScanReport::default();
    let mut track = entry.start_track;
    let mut sector = entry.start_sector;
    let mut seen = Vec::new();

    loop {
        if track == 0 {
            break;
        }
        let lba = match image.geometry.lba(track, sector) {
            Some(lba) => lba,
            None => {
                report.issues.push(ScanIssue::Error(format!(
                    "illegal track/sector {}/{} in chain",
                    track, sector
                )));
                break;
            }
        };
        if seen.contains(&lba) {
            report
                .issues
                .push(ScanIssue::Error(format!("link chain loops back to block {}", lba)));
            break;
        }
        seen.push(lba);
        report.data_blocks.push(lba);

        if is_bad_block(image.error(lba)) {
            report
                .issues
                .push(ScanIssue::Error(format!("bad block at LBA {}", lba)));
        }

        let block = image.block(lba);
        let next_track = block[0];
        let next_sector = block[1];
        if next_track == 0 {
            break;
        }
        track = next_track;
        sector = next_sector;
    }

    let declared = entry.blocks as usize;
    if declared != report.data_blocks.len() {
        report.issues.push(ScanIssue::Warning(format!(
            "directory declares {} blocks, chain has {}",
            declared,
            report.data_blocks.len()
        )));
    }

    report
}

/// Walk one side-sector group (up to six blocks) starting at
/// `(track, sector)`, returning the group's own member addresses (in
/// chain order) and the data-block LBAs it names, in sequence.
///
/// Verifies, as the group is walked: each block's own in-group index
/// (offset 2) matches its position in the chain; record length and the
/// six-pair cross-link table (offset 4..15) are identical across every
/// block in the group; and, once the group's terminator (`next_track ==
/// 0`) is reached, that the stored `(0, last-byte-index)` matches `16 +
/// 2 * (entries in this last block) - 1`. After the walk, the
/// cross-link table is compared against the group's actual member
/// addresses — "the link chain through side sectors matches the
/// explicit cross-link table in each block" (§3).
fn read_side_sector_group(
    image: &DiskImage,
    geometry: &Geometry,
    start_track: u8,
    start_sector: u8,
    issues: &mut Vec<ScanIssue>,
) -> (Vec<(u8, u8)>, Vec<u32>) {
    let mut track = start_track;
    let mut sector = start_sector;
    let mut members: Vec<(u8, u8)> = Vec::new();
    let mut data_blocks: Vec<u32> = Vec::new();
    let mut record_len: Option<u8> = None;
    let mut cross_table: Option<[(u8, u8); SSG_SIDE_SECTORS_MAX]> = None;

    loop {
        let lba = match geometry.lba(track, sector) {
            Some(lba) => lba,
            None => {
                issues.push(ScanIssue::Error(format!(
                    "illegal side-sector track/sector {}/{}",
                    track, sector
                )));
                break;
            }
        };
        members.push((track, sector));
        let block = image.block(lba);

        let index = block[SSB_OFFSET_SECTOR_NUM];
        let expected_index = (members.len() - 1) as u8;
        if index != expected_index {
            issues.push(ScanIssue::Error(format!(
                "side sector {}/{} reports index {} but is position {} in its group",
                track, sector, index, expected_index
            )));
        }

        let rl = block[SSB_OFFSET_RECORD_LEN];
        match record_len {
            None => record_len = Some(rl),
            Some(r) if r != rl => issues.push(ScanIssue::Error(
                "record length differs across side-sector chain".into(),
            )),
            _ => {}
        }

        let mut table = [(0u8, 0u8); SSG_SIDE_SECTORS_MAX];
        for (i, pair) in table.iter_mut().enumerate() {
            *pair = (
                block[SSB_OFFSET_SSG + i * 2],
                block[SSB_OFFSET_SSG + i * 2 + 1],
            );
        }
        match &cross_table {
            None => cross_table = Some(table),
            Some(t) if *t != table => issues.push(ScanIssue::Error(
                "cross-link table differs across side-sector chain".into(),
            )),
            _ => {}
        }

        let mut count_in_block = 0usize;
        for pair in block[SSB_OFFSET_SECTOR..].chunks(2) {
            if pair.len() < 2 {
                break;
            }
            let (t, s) = (pair[0], pair[1]);
            if t == 0 {
                break;
            }
            count_in_block += 1;
            match geometry.lba(t, s) {
                Some(data_lba) => data_blocks.push(data_lba),
                None => issues.push(ScanIssue::Error(format!(
                    "illegal data block {}/{} referenced from side sector",
                    t, s
                ))),
            }
        }

        let next_track = block[0];
        let next_sector = block[1];
        if next_track == 0 {
            let last_byte = next_sector;
            let expected_last_byte =
                (SSB_OFFSET_SECTOR + 2 * count_in_block).saturating_sub(1) as u8;
            if last_byte != expected_last_byte {
                issues.push(ScanIssue::Error(format!(
                    "side sector terminator encodes last-byte {} but {} data-block entries imply {}",
                    last_byte, count_in_block, expected_last_byte
                )));
            }
            break;
        }
        track = next_track;
        sector = next_sector;
    }

    if let Some(table) = cross_table {
        let mut expected = [(0u8, 0u8); SSG_SIDE_SECTORS_MAX];
        for (i, &ts) in members.iter().enumerate().take(SSG_SIDE_SECTORS_MAX) {
            expected[i] = ts;
        }
        if table != expected {
            issues.push(ScanIssue::Error(
                "cross-link table does not match the side-sector chain's actual members".into(),
            ));
        }
    }

    (members, data_blocks)
}

/// Verify a REL file's side-sector structure (`append_ssg`) and confirm
/// its data-block sequence matches the forward-link-chain sequence
/// (P3).
pub fn verify_rel_file(
    image: &DiskImage,
    entry: &DirEntry,
    geometry: &Geometry,
) -> ScanReport {
    let mut report = ScanReport::default();
    let link_chain = follow_link_chain(image, entry);
    let mut issues = Vec::new();

    let ss_blocks = if entry.side_sector_track == 0 {
        Vec::new()
    } else {
        match geometry.lba(entry.side_sector_track, entry.side_sector_sector) {
            None => {
                issues.push(ScanIssue::Error(format!(
                    "illegal side-sector track/sector {}/{}",
                    entry.side_sector_track, entry.side_sector_sector
                )));
                Vec::new()
            }
            Some(lba) => {
                let block = image.block(lba);
                if geometry.has_ssb && block[SSB_OFFSET_SUPER_254] == 254 {
                    verify_via_super_side_sector(image, geometry, block, &mut issues)
                } else {
                    let (_members, data_blocks) = read_side_sector_group(
                        image,
                        geometry,
                        entry.side_sector_track,
                        entry.side_sector_sector,
                        &mut issues,
                    );
                    data_blocks
                }
            }
        }
    };

    if ss_blocks != link_chain.data_blocks {
        issues.push(ScanIssue::Error(format!(
            "side-sector data-block sequence ({} blocks) disagrees with link-chain sequence ({} blocks)",
            ss_blocks.len(),
            link_chain.data_blocks.len()
        )));
    }

    report.data_blocks = link_chain.data_blocks;
    report.issues = issues;
    report.issues.extend(link_chain.issues);
    report
}

/// Walk a super-side-sector's pointer table (up to 126 entries at
/// offset 3..), following each non-zero pointer's own side-sector
/// group, and verify "the super-side-sector's pointers equal every 6th
/// side-sector address" (§3/P3): the flattened, in-order list of every
/// side-sector block address visited across all groups must have the
/// SSS's `i`-th pointer at position `i * 6` (every group but the last
/// is always fully populated with six side sectors).
fn verify_via_super_side_sector(
    image: &DiskImage,
    geometry: &Geometry,
    sss_block: &[u8],
    issues: &mut Vec<ScanIssue>,
) -> Vec<u32> {
    let pointers = &sss_block[SSS_OFFSET_SSB_POINTER..];
    let mut group_pointers: Vec<(u8, u8)> = Vec::new();
    for pair in pointers.chunks(2).take(SSS_INDEX_SSB_MAX) {
        if pair.len() < 2 {
            break;
        }
        let (t, s) = (pair[0], pair[1]);
        if t == 0 {
            break;
        }
        group_pointers.push((t, s));
    }

    let mut flattened: Vec<(u8, u8)> = Vec::new();
    let mut data_blocks: Vec<u32> = Vec::new();
    for &(t, s) in &group_pointers {
        let (members, group_data_blocks) = read_side_sector_group(image, geometry, t, s, issues);
        flattened.extend(members);
        data_blocks.extend(group_data_blocks);
    }

    for (i, &pointer) in group_pointers.iter().enumerate() {
        let expected = flattened.get(i * SSG_SIDE_SECTORS_MAX);
        if expected != Some(&pointer) {
            issues.push(ScanIssue::Error(format!(
                "super-side-sector pointer {} ({:?}) does not match every-6th side-sector address ({:?})",
                i, pointer, expected
            )));
        }
    }

    data_blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{FILETYPE_PRG, FILETYPE_REL, FLAG_CLOSED};
    use crate::geometry::{D64, D81};
    use crate::image::BLOCK_SIZE;

    fn blank_image() -> DiskImage {
        DiskImage::from_bytes(vec![0u8; D64.blocks as usize * BLOCK_SIZE]).unwrap()
    }

    fn blank_d81_image() -> DiskImage {
        DiskImage::from_bytes(vec![0u8; D81.blocks as usize * BLOCK_SIZE]).unwrap()
    }

    fn entry(start_track: u8, start_sector: u8, blocks: u16) -> DirEntry {
        DirEntry {
            next_track: 0,
            next_sector: 0,
            file_type: FILETYPE_PRG,
            locked: false,
            closed: true,
            start_track,
            start_sector,
            name: b"FILE".to_vec(),
            side_sector_track: 0,
            side_sector_sector: 0,
            record_len: 0,
            blocks,
        }
    }

    fn rel_entry(
        start_track: u8,
        start_sector: u8,
        side_sector_track: u8,
        side_sector_sector: u8,
        blocks: u16,
    ) -> DirEntry {
        DirEntry {
            next_track: 0,
            next_sector: 0,
            file_type: FILETYPE_REL,
            locked: false,
            closed: true,
            start_track,
            start_sector,
            name: b"RELFILE".to_vec(),
            side_sector_track,
            side_sector_sector,
            record_len: 20,
            blocks,
        }
    }

    /// Chain two data blocks `(2,0) -> (2,1) -> end` and write a single
    /// side-sector block at `(ss_track, ss_sector)` naming them, forming
    /// a one-block, one-group REL file.
    fn write_two_block_rel_file(image: &mut DiskImage, ss_track: u8, ss_sector: u8) {
        let data0 = image.geometry.lba(2, 0).unwrap();
        let data1 = image.geometry.lba(2, 1).unwrap();
        image.block_mut(data0)[0] = 2;
        image.block_mut(data0)[1] = 1;
        image.block_mut(data1)[0] = 0;
        image.block_mut(data1)[1] = 1;

        let ss_lba = image.geometry.lba(ss_track, ss_sector).unwrap();
        let ss = image.block_mut(ss_lba);
        ss[0] = 0; // terminates this (only) side-sector block
        ss[1] = (SSB_OFFSET_SECTOR + 2 * 2 - 1) as u8; // 2 data-block entries
        ss[SSB_OFFSET_SECTOR_NUM] = 0;
        ss[SSB_OFFSET_RECORD_LEN] = 20;
        ss[SSB_OFFSET_SSG] = ss_track;
        ss[SSB_OFFSET_SSG + 1] = ss_sector;
        ss[SSB_OFFSET_SECTOR] = 2;
        ss[SSB_OFFSET_SECTOR + 1] = 0;
        ss[SSB_OFFSET_SECTOR + 2] = 2;
        ss[SSB_OFFSET_SECTOR + 3] = 1;
    }

    #[test]
    fn single_block_chain_terminates_cleanly() {
        let mut image = blank_image();
        let lba = image.geometry.lba(1, 0).unwrap();
        image.block_mut(lba)[0] = 0; // next_track=0 terminates
        let report = follow_link_chain(&image, &entry(1, 0, 1));
        assert_eq!(report.data_blocks, vec![lba]);
        assert!(report.is_clean());
    }

    #[test]
    fn block_count_mismatch_is_a_warning() {
        let image = blank_image();
        let report = follow_link_chain(&image, &entry(1, 0, 5));
        assert!(report.is_clean());
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, ScanIssue::Warning(_))));
    }

    #[test]
    fn loop_in_chain_is_reported_as_error() {
        let mut image = blank_image();
        let lba1 = image.geometry.lba(1, 0).unwrap();
        let lba2 = image.geometry.lba(1, 1).unwrap();
        image.block_mut(lba1)[0] = 1;
        image.block_mut(lba1)[1] = 1;
        image.block_mut(lba2)[0] = 1;
        image.block_mut(lba2)[1] = 0;
        let report = follow_link_chain(&image, &entry(1, 0, 2));
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, ScanIssue::Error(msg) if msg.contains("loops"))));
    }

    #[test]
    fn rel_file_with_one_side_sector_verifies_cleanly() {
        let mut image = blank_image();
        write_two_block_rel_file(&mut image, 1, 5);
        let entry = rel_entry(2, 0, 1, 5, 2);
        let report = verify_rel_file(&image, &entry, &image.geometry);
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(report.data_blocks.len(), 2);
    }

    #[test]
    fn rel_file_with_wrong_side_sector_index_is_reported() {
        let mut image = blank_image();
        write_two_block_rel_file(&mut image, 1, 5);
        let ss_lba = image.geometry.lba(1, 5).unwrap();
        image.block_mut(ss_lba)[SSB_OFFSET_SECTOR_NUM] = 1; // should be 0
        let entry = rel_entry(2, 0, 1, 5, 2);
        let report = verify_rel_file(&image, &entry, &image.geometry);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, ScanIssue::Error(msg) if msg.contains("reports index"))));
    }

    #[test]
    fn rel_file_via_super_side_sector_verifies_cleanly() {
        let mut image = blank_d81_image();
        // Side-sector group: a single block at (1, 11) naming two data blocks.
        write_two_block_rel_file(&mut image, 1, 11);

        // Super-side-sector at (1, 10), pointing at the one group above.
        let sss_lba = image.geometry.lba(1, 10).unwrap();
        let sss = image.block_mut(sss_lba);
        sss[SSB_OFFSET_SUPER_254] = 254;
        sss[SSS_OFFSET_SSB_POINTER] = 1;
        sss[SSS_OFFSET_SSB_POINTER + 1] = 11;

        let entry = rel_entry(2, 0, 1, 10, 2);
        let report = verify_rel_file(&image, &entry, &image.geometry);
        assert!(report.is_clean(), "{:?}", report.issues);
        assert_eq!(report.data_blocks.len(), 2);
    }

    #[test]
    fn super_side_sector_pointer_mismatch_is_reported() {
        let mut image = blank_d81_image();
        // Group 0: one side sector at (1,11), naming the file's two data
        // blocks.
        write_two_block_rel_file(&mut image, 1, 11);

        // Group 1: a second, empty side sector at (1,21). A well-formed
        // SSS never has two non-full groups before the last one, so its
        // pointer can never land at flattened position 6 here — exactly
        // the mismatch the every-6th check exists to catch.
        let g1_lba = image.geometry.lba(1, 21).unwrap();
        let g1 = image.block_mut(g1_lba);
        g1[0] = 0;
        g1[1] = (SSB_OFFSET_SECTOR - 1) as u8;
        g1[SSB_OFFSET_SECTOR_NUM] = 0;
        g1[SSB_OFFSET_RECORD_LEN] = 20;
        g1[SSB_OFFSET_SSG] = 1;
        g1[SSB_OFFSET_SSG + 1] = 21;

        let sss_lba = image.geometry.lba(1, 10).unwrap();
        let sss = image.block_mut(sss_lba);
        sss[SSB_OFFSET_SUPER_254] = 254;
        sss[SSS_OFFSET_SSB_POINTER] = 1;
        sss[SSS_OFFSET_SSB_POINTER + 1] = 11;
        sss[SSS_OFFSET_SSB_POINTER + 2] = 1;
        sss[SSS_OFFSET_SSB_POINTER + 3] = 21;

        let entry = rel_entry(2, 0, 1, 10, 2);
        let report = verify_rel_file(&image, &entry, &image.geometry);
        assert!(report
            .issues
            .iter()
            .any(|i| matches!(i, ScanIssue::Error(msg) if msg.contains("every-6th"))));
    }
}
