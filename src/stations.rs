//! Well-known stations.
//!
//! Schedule lookup is out of scope; this table only backs the `stations`
//! command and display names. Any syntactically valid id can be recorded.

/// A broadcast station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Station {
    pub id: &'static str,
    pub name: &'static str,
}

pub const STATIONS: &[Station] = &[
    Station {
        id: "TBS",
        name: "TBSラジオ",
    },
    Station {
        id: "QRR",
        name: "文化放送",
    },
    Station {
        id: "LFR",
        name: "ニッポン放送",
    },
    Station {
        id: "RN1",
        name: "ラジオNIKKEI第1",
    },
    Station {
        id: "FMJ",
        name: "J-WAVE",
    },
];

/// Look up a station by id, ignoring ASCII case.
pub fn find(id: &str) -> Option<&'static Station> {
    STATIONS.iter().find(|s| s.id.eq_ignore_ascii_case(id))
}

/// Display name for `id`, or the id itself.
pub fn display_name(id: &str) -> &str {
    find(id).map_or(id, |s| s.name)
}
