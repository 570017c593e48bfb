//! # Product Records and Reply Formatting
//!
//! ## Purpose
//!
//! Typed view of one row of the product catalog plus the ordered field-code
//! table used when a record is sent to the cobot as a single text line.
//!
//! ## Reply Format
//!
//! ```text
//! LaufendeNummer:1_ProduktNr:WU123_Kunde:ACME_...
//! ```
//!
//! Pairs are `code:value`, joined with `_`, in [`ProductField::ALL`] order (or
//! a caller-chosen subset). A lookup miss is answered with [`NOT_FOUND_REPLY`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel sent when no record matches the identifier
pub const NOT_FOUND_REPLY: &str = "NichtVorhanden";

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\W+").expect("static regex"));

/// Catalog columns in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProductField {
    LaufendeNummer,
    Produktnummer,
    Kunde,
    Notizen,
    FrameWidth,
    FrameHeight,
    Pcb0Top,
    Pcb1Back,
    Pcb2Right,
    Pcb3Front,
    Pcb4Left,
    AfBreite,
    AfHoehe,
    AfTiefe,
    AiAngelegt,
    AiZeitstempel,
    CobotAngelegt,
    CobotZeitstempel,
    PosPcb0,
    PosPcb1,
    PosPcb2,
    PosPcb3,
    PosPcb4,
}

impl ProductField {
    /// Every field, in the fixed reply order
    pub const ALL: [ProductField; 23] = [
        ProductField::LaufendeNummer,
        ProductField::Produktnummer,
        ProductField::Kunde,
        ProductField::Notizen,
        ProductField::FrameWidth,
        ProductField::FrameHeight,
        ProductField::Pcb0Top,
        ProductField::Pcb1Back,
        ProductField::Pcb2Right,
        ProductField::Pcb3Front,
        ProductField::Pcb4Left,
        ProductField::AfBreite,
        ProductField::AfHoehe,
        ProductField::AfTiefe,
        ProductField::AiAngelegt,
        ProductField::AiZeitstempel,
        ProductField::CobotAngelegt,
        ProductField::CobotZeitstempel,
        ProductField::PosPcb0,
        ProductField::PosPcb1,
        ProductField::PosPcb2,
        ProductField::PosPcb3,
        ProductField::PosPcb4,
    ];

    /// Column name as stored in the catalog
    pub const fn label(self) -> &'static str {
        match self {
            ProductField::LaufendeNummer => "Laufende Nummer",
            ProductField::Produktnummer => "Produktnummer",
            ProductField::Kunde => "Kunde",
            ProductField::Notizen => "Notizen",
            ProductField::FrameWidth => "Frame Width (mm)",
            ProductField::FrameHeight => "Frame Height (mm)",
            ProductField::Pcb0Top => "PCB_0 Top",
            ProductField::Pcb1Back => "PCB_1 Back",
            ProductField::Pcb2Right => "PCB_2 Right",
            ProductField::Pcb3Front => "PCB_3 Front",
            ProductField::Pcb4Left => "PCB_4 Left",
            ProductField::AfBreite => "AF Breite",
            ProductField::AfHoehe => "AF Höhe",
            ProductField::AfTiefe => "AF Tiefe",
            ProductField::AiAngelegt => "AI angelegt",
            ProductField::AiZeitstempel => "AI Zeitstempel",
            ProductField::CobotAngelegt => "Cobot angelegt",
            ProductField::CobotZeitstempel => "Cobot Zeitstempel",
            ProductField::PosPcb0 => "PosPCB_0",
            ProductField::PosPcb1 => "PosPCB_1",
            ProductField::PosPcb2 => "PosPCB_2",
            ProductField::PosPcb3 => "PosPCB_3",
            ProductField::PosPcb4 => "PosPCB_4",
        }
    }

    /// Short code used on the wire
    pub const fn code(self) -> &'static str {
        match self {
            ProductField::LaufendeNummer => "LaufendeNummer",
            ProductField::Produktnummer => "ProduktNr",
            ProductField::Kunde => "Kunde",
            ProductField::Notizen => "Notizen",
            ProductField::FrameWidth => "FrameWidth",
            ProductField::FrameHeight => "FrameHeight",
            ProductField::Pcb0Top => "PCB0TOP",
            ProductField::Pcb1Back => "PCB1BACK",
            ProductField::Pcb2Right => "PCB2RIGHT",
            ProductField::Pcb3Front => "PCB3FRONT",
            ProductField::Pcb4Left => "PCB4LEFT",
            ProductField::AfBreite => "AFBreite",
            ProductField::AfHoehe => "AFHoehe",
            ProductField::AfTiefe => "AFTiefe",
            ProductField::AiAngelegt => "AIangelegt",
            ProductField::AiZeitstempel => "AIZeitstempel",
            ProductField::CobotAngelegt => "CobotAngelegt",
            ProductField::CobotZeitstempel => "CobotZeitstempel",
            ProductField::PosPcb0 => "POSPCB0",
            ProductField::PosPcb1 => "POSPCB1",
            ProductField::PosPcb2 => "POSPCB2",
            ProductField::PosPcb3 => "POSPCB3",
            ProductField::PosPcb4 => "POSPCB4",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|field| field.label() == label)
    }
}

impl fmt::Display for ProductField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Wire code for an arbitrary column label.
///
/// Known labels map through the code table; anything else is upper-cased with
/// non-word characters removed (`"Extra Feld (x)"` → `"EXTRAFELDX"`).
pub fn field_code(label: &str) -> String {
    match ProductField::from_label(label) {
        Some(field) => field.code().to_string(),
        None => NON_WORD.replace_all(label, "").to_uppercase(),
    }
}

/// Canonical form of a product identifier for catalog matching.
///
/// Case and separators are ignored: `wu-0000003` and `WU0000003` are the same
/// product.
pub fn normalize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// One catalog row.
///
/// Serde names follow the catalog column labels, so JSON exports of the
/// product table load unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(rename = "Laufende Nummer")]
    pub laufende_nummer: u32,
    #[serde(rename = "Produktnummer")]
    pub produktnummer: String,
    #[serde(rename = "Kunde")]
    pub kunde: Option<String>,
    #[serde(rename = "Notizen")]
    pub notizen: Option<String>,
    #[serde(rename = "Frame Width (mm)")]
    pub frame_width: Option<String>,
    #[serde(rename = "Frame Height (mm)")]
    pub frame_height: Option<String>,
    #[serde(rename = "PCB_0 Top")]
    pub pcb_0_top: Option<String>,
    #[serde(rename = "PCB_1 Back")]
    pub pcb_1_back: Option<String>,
    #[serde(rename = "PCB_2 Right")]
    pub pcb_2_right: Option<String>,
    #[serde(rename = "PCB_3 Front")]
    pub pcb_3_front: Option<String>,
    #[serde(rename = "PCB_4 Left")]
    pub pcb_4_left: Option<String>,
    #[serde(rename = "AF Breite")]
    pub af_breite: Option<String>,
    #[serde(rename = "AF Höhe")]
    pub af_hoehe: Option<String>,
    #[serde(rename = "AF Tiefe")]
    pub af_tiefe: Option<String>,
    #[serde(rename = "AI angelegt", default)]
    pub ai_angelegt: i64,
    #[serde(rename = "AI Zeitstempel")]
    pub ai_zeitstempel: Option<String>,
    #[serde(rename = "Cobot angelegt", default)]
    pub cobot_angelegt: i64,
    #[serde(rename = "Cobot Zeitstempel")]
    pub cobot_zeitstempel: Option<String>,
    #[serde(rename = "PosPCB_0")]
    pub pos_pcb_0: Option<String>,
    #[serde(rename = "PosPCB_1")]
    pub pos_pcb_1: Option<String>,
    #[serde(rename = "PosPCB_2")]
    pub pos_pcb_2: Option<String>,
    #[serde(rename = "PosPCB_3")]
    pub pos_pcb_3: Option<String>,
    #[serde(rename = "PosPCB_4")]
    pub pos_pcb_4: Option<String>,
}

impl ProductRecord {
    pub fn new(laufende_nummer: u32, produktnummer: impl Into<String>) -> Self {
        Self {
            laufende_nummer,
            produktnummer: produktnummer.into(),
            ..Default::default()
        }
    }

    /// Text value of one field; absent values render as an empty string
    pub fn value(&self, field: ProductField) -> String {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        match field {
            ProductField::LaufendeNummer => self.laufende_nummer.to_string(),
            ProductField::Produktnummer => self.produktnummer.clone(),
            ProductField::Kunde => text(&self.kunde),
            ProductField::Notizen => text(&self.notizen),
            ProductField::FrameWidth => text(&self.frame_width),
            ProductField::FrameHeight => text(&self.frame_height),
            ProductField::Pcb0Top => text(&self.pcb_0_top),
            ProductField::Pcb1Back => text(&self.pcb_1_back),
            ProductField::Pcb2Right => text(&self.pcb_2_right),
            ProductField::Pcb3Front => text(&self.pcb_3_front),
            ProductField::Pcb4Left => text(&self.pcb_4_left),
            ProductField::AfBreite => text(&self.af_breite),
            ProductField::AfHoehe => text(&self.af_hoehe),
            ProductField::AfTiefe => text(&self.af_tiefe),
            ProductField::AiAngelegt => self.ai_angelegt.to_string(),
            ProductField::AiZeitstempel => text(&self.ai_zeitstempel),
            ProductField::CobotAngelegt => self.cobot_angelegt.to_string(),
            ProductField::CobotZeitstempel => text(&self.cobot_zeitstempel),
            ProductField::PosPcb0 => text(&self.pos_pcb_0),
            ProductField::PosPcb1 => text(&self.pos_pcb_1),
            ProductField::PosPcb2 => text(&self.pos_pcb_2),
            ProductField::PosPcb3 => text(&self.pos_pcb_3),
            ProductField::PosPcb4 => text(&self.pos_pcb_4),
        }
    }

    /// Normalized product number, see [`normalize_identifier`]
    pub fn key(&self) -> String {
        normalize_identifier(&self.produktnummer)
    }
}

/// Build the cobot reply for an optional record
pub fn format_reply(record: Option<&ProductRecord>, fields: &[ProductField]) -> String {
    match record {
        Some(record) => fields
            .iter()
            .map(|field| format!("{}:{}", field.code(), record.value(*field)))
            .collect::<Vec<_>>()
            .join("_"),
        None => NOT_FOUND_REPLY.to_string(),
    }
}
