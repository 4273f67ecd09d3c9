//! Directory item sectors: lead items, main items and device area
//! descriptors (DADs).
//!
//! ## Lead item sector 0
//!
//! | Word   | Contents                                                 |
//! | ------ | -------------------------------------------------------- |
//! | 000    | Lead item 1 link (or no link), flagged 0o100000_000000   |
//! | 001-2  | Qualifier, Fieldata                                      |
//! | 003-4  | Filename, Fieldata                                       |
//! | 005-6  | Project id, Fieldata                                     |
//! | 007    | Read key, Fieldata                                       |
//! | 010    | Write key, ASCII                                         |
//! | 011    | S1 file type, S2 cycle count, S3 max range, S4 current   |
//! |        | range, T3 highest absolute cycle                         |
//! | 012    | T1 status bits (01000 guarded)                           |
//! | 013-   | Main item 0 links, highest cycle first                   |
//!
//! ## Main item sector 0
//!
//! | Word   | Contents                                                 |
//! | ------ | -------------------------------------------------------- |
//! | 000    | First DAD link (or no link), flagged 0o200000_000000     |
//! | 001-10 | Qualifier, filename, project id, account id              |
//! | 013    | Lead item 0 address; S1 disable flags                    |
//! | 014    | T1 descriptor flags                                      |
//! | 015    | Main item 1 address; S1 file characteristics             |
//! | 016    | Assign mnemonic                                          |
//! | 021    | H1 inhibit flags, T3 absolute cycle                      |
//! | 023    | Time of cataloging                                       |
//! | 024    | H1 initial reserve                                       |
//! | 025    | H1 maximum granules                                      |
//! | 026    | H1 highest granule assigned                              |
//! | 027    | H1 highest track written                                 |
//! | 033    | H1 preferred LDAT                                        |
//!
//! ## Main item sector 1
//!
//! Word 0 links to further main items, words 1-4 repeat the
//! qualifier and filename, word 5 holds "*No.1*", word 6 the address
//! of main item 0 and word 7 (T3) the absolute cycle.  Pack names
//! start at word 022.
//!
//! ## DAD
//!
//! | Word   | Contents                                                 |
//! | ------ | -------------------------------------------------------- |
//! | 000    | Next DAD link                                            |
//! | 001    | Previous DAD, or main item 0 for the first DAD           |
//! | 002    | First file-relative word described                       |
//! | 003    | File-relative word limit                                 |
//! | 004-   | Eight entries of three words: device word address, word  |
//! |        | count, H2 LDAT (0o400000 for a hole)                     |
use std::time::{SystemTime, UNIX_EPOCH};

use base::prelude::*;

use super::address::MfdRelativeAddress;
use super::flags::{DescriptorFlags, DisableFlags, FileCharacteristics, InhibitFlags};
use crate::fas::{FileAllocation, FileAllocationSet};
use crate::geometry::WORDS_PER_TRACK;
use crate::layout::NO_LINK;
use crate::types::LdatIndex;

pub const LEAD_ITEM_FLAG: u64 = 0o100000_000000;
pub const MAIN_ITEM_FLAG: u64 = 0o200000_000000;
const ITEM_TYPE_MASK: u64 = 0o300000_000000;
const GUARDED_STATUS: u64 = 0o1000;
const HOLE_LDAT: u64 = 0o400000;
const FIRST_LEAD_LINK: usize = 0o13;
const FIRST_PACK_NAME: usize = 0o22;
const MAX_PACK_NAMES: usize = 5;
const FIRST_DAD_ENTRY: usize = 4;
pub const DAD_ENTRIES: usize = 8;

pub const DEFAULT_MAX_CYCLE_RANGE: u64 = 31;

/// S1 of lead item word 011.
pub const FILE_TYPE_FIXED: u64 = 0;

/// Everything needed to catalog a new fixed mass storage file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRequest {
    pub qualifier: String,
    pub filename: String,
    pub project_id: String,
    pub account_id: String,
    pub read_key: String,
    pub write_key: String,
    pub mnemonic: String,
    pub absolute_cycle: u64,
    pub inhibit_flags: InhibitFlags,
    pub characteristics: FileCharacteristics,
    pub reserve: u64,
    pub max_granules: u64,
    pub pack_names: Vec<String>,
}

fn fieldata_field(text: &str, words: usize) -> impl Iterator<Item = Word36> + '_ {
    (0..words).map(move |wx| fieldata_word(text.get(wx * 6..).unwrap_or("")))
}

fn put_fieldata(sector: &mut [Word36], first: usize, words: usize, text: &str) {
    for (word, value) in sector[first..first + words]
        .iter_mut()
        .zip(fieldata_field(text, words))
    {
        *word = value;
    }
}

fn clear(sector: &mut [Word36]) {
    sector.fill(Word36::ZERO);
}

/// The directory's time stamp: seconds since the Unix epoch with the
/// high bit set to show the value is present.
pub fn software_time(now: SystemTime) -> Word36 {
    let seconds = now
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Word36::masked((seconds & 0o077777_777777) | 0o400000_000000)
}

pub fn is_lead_item0(sector: &[Word36]) -> bool {
    sector[0].bits() & ITEM_TYPE_MASK == LEAD_ITEM_FLAG
}

pub fn is_main_item0(sector: &[Word36]) -> bool {
    sector[0].bits() & ITEM_TYPE_MASK == MAIN_ITEM_FLAG
}

/// Sets up lead item sector 0 for a new file set with one cycle.
pub fn populate_lead_item0(
    sector: &mut [Word36],
    request: &CatalogRequest,
    file_type: u64,
    main_item0: MfdRelativeAddress,
) {
    clear(sector);
    sector[0] = Word36::masked(NO_LINK.bits() | LEAD_ITEM_FLAG);
    put_fieldata(sector, 1, 2, &request.qualifier);
    put_fieldata(sector, 3, 2, &request.filename);
    put_fieldata(sector, 5, 2, &request.project_id);
    if !request.read_key.is_empty() {
        sector[7] = fieldata_word(&request.read_key);
    }
    if !request.write_key.is_empty() {
        sector[8] = ascii_word(&request.write_key);
    }
    sector[9] = Word36::ZERO
        .with_s1(file_type)
        .with_s2(1)
        .with_s3(DEFAULT_MAX_CYCLE_RANGE)
        .with_s4(1)
        .with_t3(request.absolute_cycle);
    let status = if request.inhibit_flags.contains(InhibitFlags::GUARDED) {
        GUARDED_STATUS
    } else {
        0
    };
    sector[10] = Word36::ZERO.with_t1(status);
    sector[FIRST_LEAD_LINK] = main_item0.word();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadItem {
    pub qualifier: String,
    pub filename: String,
    pub project_id: String,
    pub file_type: u64,
    pub cycle_count: u64,
    pub max_range: u64,
    pub current_range: u64,
    pub highest_absolute_cycle: u64,
    pub guarded: bool,
    /// Main item 0 links for the current range; `None` for a cycle
    /// which does not exist.
    pub links: Vec<Option<MfdRelativeAddress>>,
}

impl LeadItem {
    pub fn parse(sector: &[Word36]) -> LeadItem {
        let current_range = sector[9].s4();
        let links = sector[FIRST_LEAD_LINK..]
            .iter()
            .take(current_range as usize)
            .map(|w| {
                if w.bits() == 0 {
                    None
                } else {
                    MfdRelativeAddress::from_link(*w)
                }
            })
            .collect();
        LeadItem {
            qualifier: fieldata_string(&sector[1..3]),
            filename: fieldata_string(&sector[3..5]),
            project_id: fieldata_string(&sector[5..7]),
            file_type: sector[9].s1(),
            cycle_count: sector[9].s2(),
            max_range: sector[9].s3(),
            current_range,
            highest_absolute_cycle: sector[9].t3(),
            guarded: sector[10].t1() & GUARDED_STATUS != 0,
            links,
        }
    }

    /// The main item of the highest existing cycle.
    pub fn latest_cycle(&self) -> Option<MfdRelativeAddress> {
        self.links.iter().flatten().next().copied()
    }
}

/// Sets up main item sector 0 for a fixed mass storage file which
/// has no DADs yet.
pub fn populate_main_item0(
    sector: &mut [Word36],
    request: &CatalogRequest,
    lead_item0: MfdRelativeAddress,
    main_item1: MfdRelativeAddress,
    preferred_ldat: LdatIndex,
    time: Word36,
) {
    clear(sector);
    sector[0] = Word36::masked(NO_LINK.bits() | MAIN_ITEM_FLAG);
    put_fieldata(sector, 1, 2, &request.qualifier);
    put_fieldata(sector, 3, 2, &request.filename);
    put_fieldata(sector, 5, 2, &request.project_id);
    put_fieldata(sector, 7, 2, &request.account_id);
    sector[0o13] = lead_item0.word().with_s1(DisableFlags::NONE.bits());
    sector[0o14] = Word36::ZERO.with_t1(DescriptorFlags::NONE.bits());
    sector[0o15] = main_item1
        .word()
        .with_s1(request.characteristics.compose());
    sector[0o16] = fieldata_word(&request.mnemonic);
    sector[0o21] = Word36::ZERO
        .with_h1(request.inhibit_flags.bits())
        .with_t3(request.absolute_cycle);
    sector[0o23] = time;
    sector[0o24] = Word36::ZERO.with_h1(request.reserve);
    sector[0o25] = Word36::ZERO.with_h1(request.max_granules);
    sector[0o33] = Word36::ZERO.with_h1(u64::from(preferred_ldat.0));
}

/// Sets up main item sector 1.  At most five pack names fit.
pub fn populate_main_item1(
    sector: &mut [Word36],
    request: &CatalogRequest,
    main_item0: MfdRelativeAddress,
) {
    clear(sector);
    sector[0] = NO_LINK;
    put_fieldata(sector, 1, 2, &request.qualifier);
    put_fieldata(sector, 3, 2, &request.filename);
    sector[5] = fieldata_word("*No.1*");
    sector[6] = main_item0.word();
    sector[7] = Word36::ZERO.with_t3(request.absolute_cycle);
    for (px, name) in request.pack_names.iter().take(MAX_PACK_NAMES).enumerate() {
        sector[FIRST_PACK_NAME + 2 * px] = fieldata_word(name);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainItem {
    pub qualifier: String,
    pub filename: String,
    pub project_id: String,
    pub account_id: String,
    pub first_dad: Option<MfdRelativeAddress>,
    pub lead_item0: Option<MfdRelativeAddress>,
    pub main_item1: Option<MfdRelativeAddress>,
    pub disable_flags: DisableFlags,
    pub descriptor_flags: DescriptorFlags,
    pub characteristics: FileCharacteristics,
    pub mnemonic: String,
    pub inhibit_flags: InhibitFlags,
    pub absolute_cycle: u64,
    pub reserve: u64,
    pub max_granules: u64,
    pub highest_granule_assigned: u64,
    pub highest_track_written: u64,
    pub preferred_ldat: LdatIndex,
}

impl MainItem {
    pub fn parse(sector: &[Word36]) -> MainItem {
        let address = |w: Word36| MfdRelativeAddress::from_link(Word36::masked(w.bits() & 0o7777_777777));
        MainItem {
            qualifier: fieldata_string(&sector[1..3]),
            filename: fieldata_string(&sector[3..5]),
            project_id: fieldata_string(&sector[5..7]),
            account_id: fieldata_string(&sector[7..9]),
            first_dad: MfdRelativeAddress::from_link(sector[0]),
            lead_item0: address(sector[0o13]),
            main_item1: address(sector[0o15]),
            disable_flags: DisableFlags::from_field(sector[0o13].s1()),
            descriptor_flags: DescriptorFlags::from_field(sector[0o14].t1()),
            characteristics: FileCharacteristics::from_field(sector[0o15].s1()),
            mnemonic: fieldata_string(&sector[0o16..0o17]),
            inhibit_flags: InhibitFlags::from_field(sector[0o21].h1()),
            absolute_cycle: sector[0o21].t3(),
            reserve: sector[0o24].h1(),
            max_granules: sector[0o25].h1(),
            highest_granule_assigned: sector[0o26].h1(),
            highest_track_written: sector[0o27].h1(),
            preferred_ldat: LdatIndex(sector[0o33].h1() as u32 & 0o7777),
        }
    }
}

/// Replaces the first-DAD link of main item 0, keeping its flag.
pub fn set_first_dad(main_item0: &mut [Word36], dad: Option<MfdRelativeAddress>) {
    main_item0[0] = Word36::masked(MfdRelativeAddress::link_word(dad).bits() | MAIN_ITEM_FLAG);
}

pub fn set_highest_granules(main_item0: &mut [Word36], assigned: u64, written: u64) {
    main_item0[0o26] = main_item0[0o26].with_h1(assigned);
    main_item0[0o27] = main_item0[0o27].with_h1(written);
}

/// One DAD entry.  `ldat` is `None` for a hole: a run of file words
/// with no storage behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DadEntry {
    pub device_word_address: u64,
    pub word_count: u64,
    pub ldat: Option<LdatIndex>,
}

impl DadEntry {
    fn allocation(&self, file_word_address: u64) -> Option<FileAllocation> {
        self.ldat.map(|ldat| {
            FileAllocation::new(
                file_word_address / WORDS_PER_TRACK,
                self.word_count / WORDS_PER_TRACK,
                ldat,
                self.device_word_address / WORDS_PER_TRACK,
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DadItem {
    pub next: Option<MfdRelativeAddress>,
    /// The previous DAD, or main item 0 for the first one.
    pub previous: MfdRelativeAddress,
    pub file_word_address: u64,
    pub file_word_limit: u64,
    pub entries: Vec<DadEntry>,
}

impl DadItem {
    pub fn parse(sector: &[Word36]) -> DadItem {
        let file_word_address = sector[2].bits();
        let file_word_limit = sector[3].bits();
        let mut entries = Vec::new();
        let mut cursor = file_word_address;
        for ex in 0..DAD_ENTRIES {
            if cursor >= file_word_limit {
                break;
            }
            let wx = FIRST_DAD_ENTRY + 3 * ex;
            let ldat = sector[wx + 2].h2();
            let entry = DadEntry {
                device_word_address: sector[wx].bits(),
                word_count: sector[wx + 1].bits(),
                ldat: if ldat == HOLE_LDAT {
                    None
                } else {
                    Some(LdatIndex(ldat as u32))
                },
            };
            if entry.word_count == 0 {
                break;
            }
            cursor += entry.word_count;
            entries.push(entry);
        }
        DadItem {
            next: MfdRelativeAddress::from_link(sector[0]),
            previous: MfdRelativeAddress::from_link(sector[1])
                .unwrap_or(MfdRelativeAddress::new(LdatIndex(0), 0, 0)),
            file_word_address,
            file_word_limit,
            entries,
        }
    }

    pub fn populate(&self, sector: &mut [Word36]) {
        clear(sector);
        sector[0] = MfdRelativeAddress::link_word(self.next);
        sector[1] = self.previous.word();
        sector[2] = Word36::masked(self.file_word_address);
        sector[3] = Word36::masked(self.file_word_limit);
        for (ex, entry) in self.entries.iter().take(DAD_ENTRIES).enumerate() {
            let wx = FIRST_DAD_ENTRY + 3 * ex;
            sector[wx] = Word36::masked(entry.device_word_address);
            sector[wx + 1] = Word36::masked(entry.word_count);
            sector[wx + 2] = Word36::ZERO.with_h2(match entry.ldat {
                Some(ldat) => u64::from(ldat.0),
                None => HOLE_LDAT,
            });
        }
    }

    /// The allocations this DAD describes, holes excluded.
    pub fn allocations(&self) -> Vec<FileAllocation> {
        let mut cursor = self.file_word_address;
        let mut result = Vec::new();
        for entry in &self.entries {
            result.extend(entry.allocation(cursor));
            cursor += entry.word_count;
        }
        result
    }
}

/// The DAD entries for an allocation set, with holes wherever the
/// file has unallocated tracks below its highest allocation.
pub fn dad_entries(fas: &FileAllocationSet) -> Vec<DadEntry> {
    let mut entries = Vec::new();
    let mut cursor = 0;
    for alloc in fas.allocations() {
        let region = alloc.file_region;
        if region.track_id > cursor {
            entries.push(DadEntry {
                device_word_address: 0,
                word_count: (region.track_id - cursor) * WORDS_PER_TRACK,
                ldat: None,
            });
        }
        entries.push(DadEntry {
            device_word_address: alloc.device_track_id * WORDS_PER_TRACK,
            word_count: region.track_count * WORDS_PER_TRACK,
            ldat: Some(alloc.ldat),
        });
        cursor = region.limit();
    }
    entries
}

/// Splits DAD entries into DAD items of at most eight entries each,
/// filling in the file word range of each.  Links are left for the
/// caller, who knows the sector addresses.
pub fn dad_items(entries: &[DadEntry]) -> Vec<DadItem> {
    let mut cursor = 0;
    entries
        .chunks(DAD_ENTRIES)
        .map(|chunk| {
            let first = cursor;
            cursor += chunk.iter().map(|e| e.word_count).sum::<u64>();
            DadItem {
                next: None,
                previous: MfdRelativeAddress::new(LdatIndex(0), 0, 0),
                file_word_address: first,
                file_word_limit: cursor,
                entries: chunk.to_vec(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const L1: LdatIndex = LdatIndex(1);

    fn request() -> CatalogRequest {
        CatalogRequest {
            qualifier: "SYS$".to_string(),
            filename: "MFD$$".to_string(),
            project_id: "EXEC-8".to_string(),
            account_id: "SYSTEM".to_string(),
            read_key: String::new(),
            write_key: String::new(),
            mnemonic: "F".to_string(),
            absolute_cycle: 1,
            inhibit_flags: InhibitFlags::GUARDED
                | InhibitFlags::UNLOAD_INHIBITED
                | InhibitFlags::PRIVATE,
            characteristics: FileCharacteristics::default(),
            reserve: 0,
            max_granules: 262_153,
            pack_names: vec!["FIX000".to_string()],
        }
    }

    #[test]
    fn test_lead_item() {
        let main0 = MfdRelativeAddress::new(L1, 0, 2);
        let mut sector = vec![Word36::masked(Word36::MASK); 28];
        populate_lead_item0(&mut sector, &request(), FILE_TYPE_FIXED, main0);
        assert!(is_lead_item0(&sector));
        assert!(!is_main_item0(&sector));
        assert_eq!(sector[0].bits(), 0o500000_000000);
        let lead = LeadItem::parse(&sector);
        assert_eq!(lead.qualifier, "SYS$");
        assert_eq!(lead.filename, "MFD$$");
        assert_eq!(lead.project_id, "EXEC-8");
        assert_eq!(lead.cycle_count, 1);
        assert_eq!(lead.max_range, 31);
        assert_eq!(lead.current_range, 1);
        assert_eq!(lead.highest_absolute_cycle, 1);
        assert!(lead.guarded);
        assert_eq!(lead.latest_cycle(), Some(main0));
    }

    #[test]
    fn test_main_items() {
        let lead0 = MfdRelativeAddress::new(L1, 0, 1);
        let main0 = MfdRelativeAddress::new(L1, 0, 2);
        let main1 = MfdRelativeAddress::new(L1, 0, 3);
        let mut sector = vec![Word36::ZERO; 28];
        populate_main_item0(&mut sector, &request(), lead0, main1, L1, Word36::ZERO);
        assert!(is_main_item0(&sector));
        assert_eq!(sector[0].bits(), 0o600000_000000);
        let item = MainItem::parse(&sector);
        assert_eq!(item.first_dad, None);
        assert_eq!(item.lead_item0, Some(lead0));
        assert_eq!(item.main_item1, Some(main1));
        assert_eq!(item.account_id, "SYSTEM");
        assert_eq!(item.mnemonic, "F");
        assert_eq!(item.inhibit_flags.bits(), 0o70);
        assert_eq!(item.absolute_cycle, 1);
        assert_eq!(item.max_granules, 262_153);
        assert_eq!(item.preferred_ldat, L1);

        let dad = MfdRelativeAddress::new(L1, 0, 7);
        set_first_dad(&mut sector, Some(dad));
        assert!(is_main_item0(&sector));
        assert_eq!(MainItem::parse(&sector).first_dad, Some(dad));

        let mut sector1 = vec![Word36::ZERO; 28];
        populate_main_item1(&mut sector1, &request(), main0);
        assert_eq!(sector1[0], NO_LINK);
        assert_eq!(fieldata_string(&sector1[5..6]), "*NO.1*");
        assert_eq!(sector1[6], main0.word());
        assert_eq!(fieldata_string(&sector1[0o22..0o23]), "FIX000");
        assert!(!is_lead_item0(&sector1) && !is_main_item0(&sector1));
    }

    #[test]
    fn test_dad_entries_with_holes() {
        let mut fas = FileAllocationSet::new(MfdRelativeAddress::new(L1, 0, 2), None);
        fas.merge_in(FileAllocation::new(0, 2, L1, 100));
        fas.merge_in(FileAllocation::new(5, 1, LdatIndex(2), 40));
        let entries = dad_entries(&fas);
        assert_eq!(
            entries,
            vec![
                DadEntry {
                    device_word_address: 100 * 1792,
                    word_count: 2 * 1792,
                    ldat: Some(L1)
                },
                DadEntry {
                    device_word_address: 0,
                    word_count: 3 * 1792,
                    ldat: None
                },
                DadEntry {
                    device_word_address: 40 * 1792,
                    word_count: 1792,
                    ldat: Some(LdatIndex(2))
                },
            ]
        );

        let items = dad_items(&entries);
        assert_eq!(items.len(), 1);
        let mut sector = vec![Word36::ZERO; 28];
        items[0].populate(&mut sector);
        let parsed = DadItem::parse(&sector);
        assert_eq!(parsed.file_word_limit, 6 * 1792);
        assert_eq!(parsed.entries, entries);
        assert_eq!(parsed.allocations(), fas.allocations());
    }

    #[test]
    fn test_dad_items_split_at_eight_entries() {
        let mut fas = FileAllocationSet::new(MfdRelativeAddress::new(L1, 0, 2), None);
        for k in 0..10 {
            fas.merge_in(FileAllocation::new(k, 1, L1, 100 + 2 * k));
        }
        let items = dad_items(&dad_entries(&fas));
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].entries.len(), 8);
        assert_eq!(items[1].file_word_address, 8 * 1792);
        assert_eq!(items[1].file_word_limit, 10 * 1792);
    }
}
