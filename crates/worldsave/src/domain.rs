// Copyright (C) 2026 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::path::{Path, PathBuf};

use crate::commit::Triad;
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// One independently persisted category of world data, with its own file triad.
///
/// Declaration order is load order.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Domain {
    Pol,
    Objects,
    Pcs,
    PcEquip,
    Npcs,
    NpcEquip,
    Items,
    Multis,
    Storage,
    Resource,
    Guilds,
    Datastore,
    Parties,
}

/// Staging file extension.
pub const STAGING_EXT: &str = "ndt";
/// Stable file extension.
pub const STABLE_EXT: &str = "txt";
/// Backup file extension.
pub const BACKUP_EXT: &str = "bak";
/// Extension of data files written by older servers, renamed to [`STABLE_EXT`] on load.
pub const LEGACY_EXT: &str = "dat";

impl Domain {
    pub fn all() -> impl Iterator<Item = Domain> {
        Domain::iter()
    }

    pub fn file_stem(self) -> &'static str {
        self.into()
    }

    /// Comment lines written at the top of the domain's file.
    pub fn header(self) -> &'static [&'static str] {
        match self {
            Domain::Pol => &[],
            Domain::Objects => &["OBJECTS.TXT: Global Object Data"],
            Domain::Pcs => &[
                "PCS.TXT: Player-Character Data",
                "",
                "In addition to PC data, this also contains hair, beards, death shrouds,",
                "and backpacks, but not the contents of each backpack.",
            ],
            Domain::PcEquip => &[
                "PCEQUIP.TXT: Player-Character Equipment Data",
                "",
                "This file can be deleted to wipe all items held/equipped by characters",
                "Note that hair, beards, empty backpacks, and death shrouds are in PCS.TXT.",
            ],
            Domain::Npcs => &[
                "NPCS.TXT: Nonplayer-Character Data",
                "",
                "If you delete this file to perform an NPC wipe,",
                "be sure to also delete NPCEQUIP.TXT",
            ],
            Domain::NpcEquip => &[
                "NPCEQUIP.TXT: Nonplayer-Character Equipment Data",
                "",
                "Delete this file along with NPCS.TXT to perform an NPC wipe",
            ],
            Domain::Items => &[
                "ITEMS.TXT: Item data",
                "",
                "This file also contains ship and house components (doors, planks etc)",
            ],
            Domain::Multis => &[
                "MULTIS.TXT: Ship and House data",
                "",
                "Deleting this file will not properly wipe houses and ships,",
                "because doors, planks, and tillermen will be left in the world.",
            ],
            Domain::Storage => &[
                "STORAGE.TXT: Contains bank boxes, vendor inventories, and other data.",
                "",
                "This file can safely be deleted to wipe bank boxes and vendor inventories.",
                "Note that scripts may use this for other types of storage as well",
            ],
            Domain::Resource => &["RESOURCE.TXT: Resource System Data"],
            Domain::Guilds => &["GUILDS.TXT: Guild Data"],
            Domain::Datastore => &["DATASTORE.TXT: DataStore Data"],
            Domain::Parties => &["PARTIES.TXT: Party Data"],
        }
    }

    pub fn path(self, data_dir: &Path, ext: &str) -> PathBuf {
        data_dir.join(format!("{}.{ext}", self.file_stem()))
    }

    pub fn triad(self, data_dir: &Path) -> Triad {
        Triad::new(data_dir, self.file_stem())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_file_stems() {
        let stems: Vec<_> = Domain::all().map(Domain::file_stem).collect();
        assert_eq!(
            stems,
            vec![
                "pol",
                "objects",
                "pcs",
                "pcequip",
                "npcs",
                "npcequip",
                "items",
                "multis",
                "storage",
                "resource",
                "guilds",
                "datastore",
                "parties"
            ]
        );
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(Domain::from_str("npcequip").unwrap(), Domain::NpcEquip);
        assert_eq!(Domain::PcEquip.to_string(), "pcequip");
        assert!(Domain::from_str("accounts").is_err());
    }

    #[test]
    fn test_paths() {
        let dir = Path::new("/srv/data");
        let triad = Domain::Items.triad(dir);
        assert_eq!(triad.staging, PathBuf::from("/srv/data/items.ndt"));
        assert_eq!(triad.stable, PathBuf::from("/srv/data/items.txt"));
        assert_eq!(triad.backup, PathBuf::from("/srv/data/items.bak"));
        assert_eq!(
            Domain::Items.path(dir, LEGACY_EXT),
            PathBuf::from("/srv/data/items.dat")
        );
    }
}
