//! Code → label lookup tables.
//!
//! A [`LabelTable`] maps raw categorical codes (municipality numbers, brand
//! keys) to display labels or group names. Tables are immutable once built.
//! The built-in tables live in a process-wide registry initialized on first
//! use and exposed read-only through [`LabelRegistry::builtin`].

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// An immutable code → label mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
    /// Codes in declaration order.
    codes: Vec<String>,
    labels: HashMap<String, String>,
}

impl LabelTable {
    /// Build a table from `(code, label)` pairs.
    ///
    /// When a code repeats, the first pairing wins.
    pub fn from_pairs<I, C, L>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (C, L)>,
        C: Into<String>,
        L: Into<String>,
    {
        let mut table = Self::default();
        for (code, label) in pairs {
            let code = code.into();
            if table.labels.contains_key(&code) {
                continue;
            }
            table.codes.push(code.clone());
            table.labels.insert(code, label.into());
        }
        table
    }

    /// Build a grouping table from `group → [codes]` lists, in group order.
    ///
    /// A code listed under several groups belongs to the first one.
    pub fn from_groups<'a, I>(groups: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a [&'a str])>,
    {
        Self::from_pairs(
            groups
                .into_iter()
                .flat_map(|(group, codes)| codes.iter().map(move |c| (*c, group))),
        )
    }

    /// Label for `code`, if the table knows it.
    pub fn lookup(&self, code: &str) -> Option<&str> {
        self.labels.get(code).map(String::as_str)
    }

    /// Label for `code`, falling back to the raw code.
    pub fn label_or_raw(&self, code: &str) -> String {
        self.lookup(code).unwrap_or(code).to_string()
    }

    /// Number of codes in the table.
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

/// Named label tables.
#[derive(Debug, Clone, Default)]
pub struct LabelRegistry {
    tables: HashMap<String, Arc<LabelTable>>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table.
    pub fn insert(&mut self, name: impl Into<String>, table: LabelTable) {
        self.tables.insert(name.into(), Arc::new(table));
    }

    pub fn get(&self, name: &str) -> Option<Arc<LabelTable>> {
        self.tables.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Table names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// A registry holding the built-in tables plus everything in `self`
    /// (local tables shadow built-ins of the same name).
    pub fn layered_on_builtin(&self) -> Self {
        let mut merged = Self::builtin().clone();
        for (name, table) in &self.tables {
            merged.tables.insert(name.clone(), Arc::clone(table));
        }
        merged
    }

    /// The process-wide built-in registry. Built once, never mutated.
    pub fn builtin() -> &'static LabelRegistry {
        static BUILTIN: OnceLock<LabelRegistry> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            let mut registry = LabelRegistry::new();
            registry.insert(
                "bergen_municipalities",
                LabelTable::from_pairs(BERGEN_MUNICIPALITIES.iter().map(|(c, l)| (c.to_string(), *l))),
            );
            registry.insert("hyatt_brand_groups", LabelTable::from_groups(HYATT_BRAND_GROUPS.iter().copied()));
            registry
        })
    }
}

/// Bergen County, NJ municipality codes used by property tax records.
const BERGEN_MUNICIPALITIES: &[(u32, &str)] = &[
    (201, "Allendale"),
    (202, "Alpine"),
    (203, "Bergenfield"),
    (204, "Bogota"),
    (205, "Carlstadt"),
    (206, "Cliffside Park"),
    (207, "Closter"),
    (208, "Cresskill"),
    (209, "Demarest"),
    (210, "Dumont"),
    (211, "Elmwood Park"),
    (212, "East Rutherford"),
    (213, "Edgewater"),
    (214, "Emerson"),
    (215, "Englewood"),
    (216, "Englewood Cliffs"),
    (217, "Fair Lawn"),
    (218, "Fairview"),
    (219, "Fort Lee"),
    (220, "Franklin Lakes"),
    (221, "Garfield"),
    (222, "Glen Rock"),
    (223, "Hackensack"),
    (224, "Harrington Park"),
    (225, "Hasbrouck Heights"),
    (226, "Haworth"),
    (227, "Hillsdale"),
    (228, "Ho Ho Kus"),
    (229, "Leonia"),
    (230, "Little Ferry"),
    (231, "Lodi"),
    (232, "Lyndhurst"),
    (233, "Mahwah"),
    (234, "Maywood"),
    (235, "Midland Park"),
    (236, "Montvale"),
    (237, "Moonachie"),
    (238, "New Milford"),
    (239, "North Arlington"),
    (240, "Northvale"),
    (241, "Norwood"),
    (242, "Oakland"),
    (243, "Old Tappan"),
    (244, "Oradell"),
    (245, "Palisades Park"),
    (246, "Paramus"),
    (247, "Park Ridge"),
    (248, "Ramsey"),
    (249, "Ridgefield"),
    (250, "Ridgefield Park Village"),
    (251, "Ridgewood Village"),
    (252, "River Edge"),
    (253, "River Vale"),
    (254, "Rochelle Park"),
    (255, "Rockleigh"),
    (256, "Rutherford"),
    (257, "Saddle Brook"),
    (258, "Saddle River"),
    (259, "South Hackensack"),
    (260, "Teaneck"),
    (261, "Tenafly"),
    (262, "Teterboro"),
    (263, "Upper Saddle River"),
    (264, "Waldwick"),
    (265, "Wallington"),
    (266, "Washington"),
    (267, "Westwood"),
    (268, "Woodcliff Lake"),
    (269, "Wood Ridge"),
    (270, "Wyckoff"),
];

/// Hotel brand key → brand family.
const HYATT_BRAND_GROUPS: &[(&str, &[&str])] = &[
    ("Luxury", &["PARK", "ALILA", "MIRAVAL", "IMPRESSION", "UNBOUND"]),
    (
        "Lifestyle",
        &["ANDAZ", "THOMPSON", "JDV", "DREAM", "CAPTION", "BREATHLESS", "ME_AND_ALL"],
    ),
    (
        "Inclusive",
        &["ZOETRY", "ZIVA", "ZILARA", "DREAMS", "VIVID", "SUNSCAPE", "ALUA", "SECRETS"],
    ),
    (
        "Classics",
        &["GRAND", "REGENCY", "DESTINATION", "CENTRIC", "VACATION", "HYATT"],
    ),
    ("Essentials", &["CAPTION", "PLACE", "HOUSE", "STUDIOS", "URCOVE"]),
];
