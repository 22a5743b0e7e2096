//! Driver and GPU generation classification.
//!
//! Everything here is a pure function of the vendor / renderer / version
//! strings, so a driver can be "detected" from strings captured in a bug
//! report without a live context.

use std::fmt;

use super::version::Version;

/// The GL implementation behind the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Driver {
    R100,
    R200,
    R300C,
    R300G,
    R600C,
    R600G,
    RadeonSI,
    Nouveau,
    Intel,
    NVidia,
    Catalyst,
    Swrast,
    Softpipe,
    Llvmpipe,
    VirtualBox,
    VMware,
    Qualcomm,
    Virgl,
    Panfrost,
    Lima,
    VC4,
    V3D,
    #[default]
    Unknown,
}

impl Driver {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::R100 => "Radeon",
            Self::R200 => "R200",
            Self::R300C => "R300C",
            Self::R300G => "R300G",
            Self::R600C => "R600C",
            Self::R600G => "R600G",
            Self::RadeonSI => "RadeonSI",
            Self::Nouveau => "Nouveau",
            Self::Intel => "Intel",
            Self::NVidia => "NVIDIA",
            Self::Catalyst => "Catalyst",
            Self::Swrast => "Software rasterizer",
            Self::Softpipe => "softpipe",
            Self::Llvmpipe => "LLVMpipe",
            Self::VirtualBox => "VirtualBox (Chromium)",
            Self::VMware => "VMware (SVGA3D)",
            Self::Qualcomm => "Qualcomm",
            Self::Virgl => "Virgl (virtio-gpu, Qemu/KVM guest)",
            Self::Panfrost => "Panfrost",
            Self::Lima => "Mali (Lima)",
            Self::VC4 => "VideoCore IV",
            Self::V3D => "VideoCore 3D",
            Self::Unknown => "Unknown",
        }
    }

    /// CPU rasterizers.
    #[must_use]
    pub fn is_software(self) -> bool {
        matches!(self, Self::Swrast | Self::Softpipe | Self::Llvmpipe)
    }

    /// Paravirtualized GPUs.
    #[must_use]
    pub fn is_virtual_machine(self) -> bool {
        matches!(self, Self::VirtualBox | Self::VMware | Self::Virgl)
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// GPU generation. Variants are ordered oldest-first within each family, so
/// `chip < ChipClass::NV40` reads as "older than NV40".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ChipClass {
    // Radeon
    R100,
    R200,
    R300,
    R400,
    R500,
    R600,
    R700,
    Evergreen,
    NorthernIslands,
    SouthernIslands,
    SeaIslands,
    VolcanicIslands,
    ArcticIslands,
    Vega,
    Navi,
    UnknownRadeon,

    // NVIDIA
    NV10,
    NV20,
    NV30,
    NV40,
    G80,
    GF100,
    UnknownNVidia,

    // Intel
    I8XX,
    I915,
    I965,
    SandyBridge,
    IvyBridge,
    Haswell,
    BayTrail,
    Cherryview,
    Broadwell,
    ApolloLake,
    Skylake,
    GeminiLake,
    KabyLake,
    CoffeeLake,
    WhiskeyLake,
    CometLake,
    CannonLake,
    IceLake,
    TigerLake,
    UnknownIntel,

    // Qualcomm
    Adreno1XX,
    Adreno2XX,
    Adreno3XX,
    Adreno4XX,
    Adreno5XX,
    UnknownAdreno,

    // Mali (Lima)
    Mali400,
    Mali450,
    Mali470,
    UnknownLima,

    // Mali (Panfrost)
    MaliT7XX,
    MaliT8XX,
    MaliGXX,
    UnknownPanfrost,

    // Broadcom
    VideoCoreIV,
    UnknownVideoCore4,
    VideoCore3D,
    UnknownVideoCore3D,

    #[default]
    UnknownChipClass,
}

impl ChipClass {
    #[must_use]
    pub fn is_radeon(self) -> bool {
        (Self::R100..=Self::UnknownRadeon).contains(&self)
    }

    #[must_use]
    pub fn is_nvidia(self) -> bool {
        (Self::NV10..=Self::UnknownNVidia).contains(&self)
    }

    #[must_use]
    pub fn is_intel(self) -> bool {
        (Self::I8XX..=Self::UnknownIntel).contains(&self)
    }

    #[must_use]
    pub fn is_adreno(self) -> bool {
        (Self::Adreno1XX..=Self::UnknownAdreno).contains(&self)
    }

    #[must_use]
    pub fn is_lima(self) -> bool {
        (Self::Mali400..=Self::UnknownLima).contains(&self)
    }

    #[must_use]
    pub fn is_panfrost(self) -> bool {
        (Self::MaliT7XX..=Self::UnknownPanfrost).contains(&self)
    }

    #[must_use]
    pub fn is_videocore4(self) -> bool {
        (Self::VideoCoreIV..=Self::UnknownVideoCore4).contains(&self)
    }

    #[must_use]
    pub fn is_videocore3d(self) -> bool {
        (Self::VideoCore3D..=Self::UnknownVideoCore3D).contains(&self)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::R100 => "R100",
            Self::R200 => "R200",
            Self::R300 => "R300",
            Self::R400 => "R400",
            Self::R500 => "R500",
            Self::R600 => "R600",
            Self::R700 => "R700",
            Self::Evergreen => "EVERGREEN",
            Self::NorthernIslands => "Northern Islands",
            Self::SouthernIslands => "Southern Islands",
            Self::SeaIslands => "Sea Islands",
            Self::VolcanicIslands => "Volcanic Islands",
            Self::ArcticIslands => "Arctic Islands",
            Self::Vega => "Vega",
            Self::Navi => "Navi",
            Self::NV10 => "NV10",
            Self::NV20 => "NV20",
            Self::NV30 => "NV30",
            Self::NV40 => "NV40/G70",
            Self::G80 => "G80/G90",
            Self::GF100 => "GF100",
            Self::I8XX => "i830/i835",
            Self::I915 => "i915/i945",
            Self::I965 => "i965",
            Self::SandyBridge => "SandyBridge",
            Self::IvyBridge => "IvyBridge",
            Self::Haswell => "Haswell",
            Self::BayTrail => "Bay Trail",
            Self::Cherryview => "Cherryview",
            Self::Broadwell => "Broadwell",
            Self::ApolloLake => "Apollo Lake",
            Self::Skylake => "Skylake",
            Self::GeminiLake => "Gemini Lake",
            Self::KabyLake => "Kaby Lake",
            Self::CoffeeLake => "Coffee Lake",
            Self::WhiskeyLake => "Whiskey Lake",
            Self::CometLake => "Comet Lake",
            Self::CannonLake => "Cannon Lake",
            Self::IceLake => "Ice Lake",
            Self::TigerLake => "Tiger Lake",
            Self::Adreno1XX => "Adreno 1xx series",
            Self::Adreno2XX => "Adreno 2xx series",
            Self::Adreno3XX => "Adreno 3xx series",
            Self::Adreno4XX => "Adreno 4xx series",
            Self::Adreno5XX => "Adreno 5xx series",
            Self::Mali400 => "Mali 400 series",
            Self::Mali450 => "Mali 450 series",
            Self::Mali470 => "Mali 470 series",
            Self::MaliT7XX => "Mali T7xx series",
            Self::MaliT8XX => "Mali T8xx series",
            Self::MaliGXX => "Mali Gxx series",
            Self::VideoCoreIV => "VideoCore IV",
            Self::VideoCore3D => "VideoCore 3D",
            Self::UnknownRadeon
            | Self::UnknownNVidia
            | Self::UnknownIntel
            | Self::UnknownAdreno
            | Self::UnknownLima
            | Self::UnknownPanfrost
            | Self::UnknownVideoCore4
            | Self::UnknownVideoCore3D
            | Self::UnknownChipClass => "Unknown",
        }
    }
}

impl fmt::Display for ChipClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── String Scanning ──────────────────────────────────────────────────────────

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn is_word_char(c: Option<char>) -> bool {
    c.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Finds `prefix` followed by `min..=max` digits (in `radix`) and returns the
/// number. With `bounded`, the match must start and end on a word boundary.
fn prefixed_number(text: &str, prefix: &str, min: usize, max: usize, radix: u32, bounded: bool) -> Option<u32> {
    for (start, _) in text.char_indices() {
        if !text[start..].starts_with(prefix) {
            continue;
        }
        if bounded && is_word_char(text[..start].chars().next_back()) {
            continue;
        }
        let after = &text[start + prefix.len()..];
        let len = after
            .chars()
            .take(max)
            .take_while(|c| c.is_digit(radix) && (radix == 10 || !c.is_ascii_lowercase()))
            .count();
        if len < min {
            continue;
        }
        if bounded && is_word_char(after[len..].chars().next()) {
            continue;
        }
        if let Ok(value) = u32::from_str_radix(&after[..len], radix) {
            return Some(value);
        }
    }
    None
}

/// `GeForce <optional series prefix><N digits>` followed by `M` or a boundary.
fn geforce_model(text: &str, series: &[&str], digits: usize) -> Option<u32> {
    let mut search = 0;
    while let Some(pos) = text[search..].find("GeForce ") {
        let start = search + pos + "GeForce ".len();
        search = start;
        let mut rest = &text[start..];
        if let Some(stripped) = series.iter().find_map(|s| rest.strip_prefix(s)) {
            rest = stripped;
        }
        let len = rest.chars().take_while(char::is_ascii_digit).count();
        if len != digits {
            continue;
        }
        let next = rest[len..].chars().next();
        if next == Some('M') || !is_word_char(next) {
            if let Ok(value) = rest[..len].parse() {
                return Some(value);
            }
        }
    }
    None
}

// ─── Chip Classification ──────────────────────────────────────────────────────

/// Radeon generation from a chipset or marketing name.
#[must_use]
pub fn detect_radeon_class(chipset: &str) -> ChipClass {
    if chipset.is_empty() {
        return ChipClass::UnknownRadeon;
    }

    let table: &[(&[&str], ChipClass)] = &[
        (&["R100", "RV100", "RS100"], ChipClass::R100),
        (&["RV200", "RS200", "R200", "RV250", "RS300", "RV280"], ChipClass::R200),
        (&["R300", "R350", "R360", "RV350", "RV370", "RV380"], ChipClass::R300),
        (
            &[
                "R420", "R423", "R430", "R480", "R481", "RV410", "RS400", "RC410", "RS480", "RS482",
                "RS600", "RS690", "RS740",
            ],
            ChipClass::R400,
        ),
        (&["RV515", "R520", "RV530", "R580", "RV560", "RV570"], ChipClass::R500),
        (
            &["R600", "RV610", "RV630", "RV670", "RV620", "RV635", "RS780", "RS880"],
            ChipClass::R600,
        ),
        (&["R700", "RV770", "RV730", "RV710", "RV740"], ChipClass::R700),
        (
            &["EVERGREEN", "CEDAR", "REDWOOD", "JUNIPER", "CYPRESS", "HEMLOCK", "PALM"],
            ChipClass::Evergreen,
        ),
        (&["SUMO", "BARTS", "TURKS", "CAICOS", "CAYMAN"], ChipClass::NorthernIslands),
        (&["TAHITI", "PITCAIRN", "VERDE", "OLAND", "HAINAN"], ChipClass::SouthernIslands),
        (&["BONAIRE", "KAVERI", "KABINI", "HAWAII", "MULLINS"], ChipClass::SeaIslands),
        (&["TONGA", "TOPAZ", "FIJI", "CARRIZO", "STONEY"], ChipClass::VolcanicIslands),
        (&["POLARIS10", "POLARIS11", "POLARIS12", "VEGAM"], ChipClass::ArcticIslands),
        (
            &["VEGA10", "VEGA12", "VEGA20", "RAVEN", "RENOIR", "ARCTURUS"],
            ChipClass::Vega,
        ),
        (&["NAVI10", "NAVI12", "NAVI14"], ChipClass::Navi),
    ];
    if let Some((_, class)) = table.iter().find(|(names, _)| contains_any(chipset, names)) {
        return *class;
    }

    // "HD 6950"
    if let Some(id) = prefixed_number(chipset, "HD ", 4, 4, 10, false) {
        return match id {
            6250 | 6310 => ChipClass::Evergreen,
            6000..=6999 => ChipClass::NorthernIslands,
            5000..=5999 => ChipClass::Evergreen,
            4000..=4999 => ChipClass::R700,
            2000..=3999 => ChipClass::R600,
            _ => ChipClass::UnknownRadeon,
        };
    }

    // "X1650", "X800"
    if let Some(id) = prefixed_number(chipset, "X", 3, 4, 10, false) {
        return match id {
            1300.. => ChipClass::R500,
            700..=999 | 1200..=1299 => ChipClass::R400,
            300..=699 | 1000..=1199 => ChipClass::R300,
            _ => ChipClass::UnknownRadeon,
        };
    }

    // "9800"
    if let Some(id) = prefixed_number(chipset, "", 4, 4, 10, true) {
        return match id {
            7000..=7999 => ChipClass::R100,
            8000..=9499 => ChipClass::R200,
            9500.. => ChipClass::R300,
            2100 => ChipClass::R400,
            _ => ChipClass::UnknownRadeon,
        };
    }

    ChipClass::UnknownRadeon
}

/// NVIDIA generation from an `NVxx` chipset id or a GeForce marketing name.
#[must_use]
pub fn detect_nvidia_class(chipset: &str) -> ChipClass {
    if let Some(id) = prefixed_number(chipset, "NV", 2, 2, 16, true) {
        return match id & 0xf0 {
            0x00 | 0x10 => ChipClass::NV10,
            0x20 => ChipClass::NV20,
            0x30 => ChipClass::NV30,
            0x40 | 0x60 => ChipClass::NV40,
            0x50 | 0x80 | 0x90 | 0xa0 => ChipClass::G80,
            _ => ChipClass::UnknownNVidia,
        };
    }

    if contains_any(chipset, &["GeForce2", "GeForce 256"]) {
        return ChipClass::NV10;
    }
    if chipset.contains("GeForce3") {
        return ChipClass::NV20;
    }
    if chipset.contains("GeForce4") {
        if contains_any(chipset, &["MX 420", "MX 440", "MX 460", "MX 4000", "PCX 4300"]) {
            return ChipClass::NV10;
        }
        return ChipClass::NV20;
    }

    // GeForce 5,6,7,8,9
    if let Some(id) = geforce_model(chipset, &["FX ", "PCX ", "Go "], 4) {
        return match id {
            0..6000 => ChipClass::NV30,
            6000..8000 => ChipClass::NV40,
            _ => ChipClass::G80,
        };
    }

    // GeForce 100/200/300/400/500
    if let Some(id) = geforce_model(chipset, &["G ", "GTX ", "GTS ", "GT "], 3) {
        return match id {
            400..600 => ChipClass::GF100,
            100..400 => ChipClass::G80,
            _ => ChipClass::UnknownNVidia,
        };
    }

    ChipClass::UnknownNVidia
}

/// Intel generation from the renderer string.
#[must_use]
pub fn detect_intel_class(chipset: &str) -> ChipClass {
    let table: &[(&[&str], ChipClass)] = &[
        (&["845G", "830M", "852GM/855GM", "865G"], ChipClass::I8XX),
        (
            &[
                "915G", "E7221G", "915GM", "945G", "945GM", "945GME", "Q33", "Q35", "G33", "965Q",
                "946GZ", "IGD",
            ],
            ChipClass::I915,
        ),
        (
            &[
                "965G", "G45/G43", "965GM", "965GME/GLE", "GM45", "Q45/Q43", "G41", "B43", "Ironlake",
            ],
            ChipClass::I965,
        ),
        (&["Sandybridge", "SNB GT"], ChipClass::SandyBridge),
        (&["Ivybridge", "IVB GT"], ChipClass::IvyBridge),
        (&["Haswell", "HSW GT"], ChipClass::Haswell),
        (&["BYT"], ChipClass::BayTrail),
        (&["CHV", "BSW"], ChipClass::Cherryview),
        (&["BDW GT"], ChipClass::Broadwell),
        (&["SKL GT"], ChipClass::Skylake),
        (&["APL"], ChipClass::ApolloLake),
        (&["KBL GT"], ChipClass::KabyLake),
        (&["WHL GT"], ChipClass::WhiskeyLake),
        (&["CML GT"], ChipClass::CometLake),
        (&["CNL GT"], ChipClass::CannonLake),
        (&["CFL GT"], ChipClass::CoffeeLake),
        (&["ICL GT"], ChipClass::IceLake),
        (&["TGL GT"], ChipClass::TigerLake),
    ];
    table
        .iter()
        .find(|(names, _)| contains_any(chipset, names))
        .map_or(ChipClass::UnknownIntel, |(_, class)| *class)
}

/// Adreno series from `"Adreno (TM) 530"`-style renderer strings.
#[must_use]
pub fn detect_qualcomm_class(renderer: &str) -> ChipClass {
    if !renderer.contains("Adreno") {
        return ChipClass::UnknownChipClass;
    }
    let Some(value) = renderer.split(' ').nth(2).and_then(|t| t.parse::<u32>().ok()) else {
        return ChipClass::UnknownAdreno;
    };
    match value {
        100..200 => ChipClass::Adreno1XX,
        200..300 => ChipClass::Adreno2XX,
        300..400 => ChipClass::Adreno3XX,
        400..500 => ChipClass::Adreno4XX,
        500..600 => ChipClass::Adreno5XX,
        _ => ChipClass::UnknownAdreno,
    }
}

#[must_use]
pub fn detect_panfrost_class(renderer: &str) -> ChipClass {
    if contains_any(renderer, &["T720", "T760"]) {
        ChipClass::MaliT7XX
    } else if contains_any(renderer, &["T820", "T830", "T860", "T880"]) {
        ChipClass::MaliT8XX
    } else if contains_any(renderer, &["G31", "G51", "G52", "G57", "G72", "G76"]) {
        ChipClass::MaliGXX
    } else {
        ChipClass::UnknownPanfrost
    }
}

#[must_use]
pub fn detect_lima_class(renderer: &str) -> ChipClass {
    if renderer.contains("400") {
        ChipClass::Mali400
    } else if renderer.contains("450") {
        ChipClass::Mali450
    } else if renderer.contains("470") {
        ChipClass::Mali470
    } else {
        ChipClass::UnknownLima
    }
}

// ─── Driver Classification ────────────────────────────────────────────────────

/// Result of [`classify`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Classification {
    pub driver: Driver,
    pub chip_class: ChipClass,
    pub chipset: String,
    /// Vendor driver version, for non-Mesa drivers that report one.
    pub driver_version: Version,
}

const R600G_MARKERS: &[&str] = &[
    "R6", "R7", "RV6", "RV7", "RS780", "RS880", "CEDAR", "REDWOOD", "JUNIPER", "CYPRESS", "HEMLOCK",
    "PALM", "EVERGREEN", "SUMO", "BARTS", "TURKS", "CAICOS", "CAYMAN",
];

const RADEONSI_MARKERS: &[&str] = &[
    "TAHITI", "PITCAIRN", "VERDE", "OLAND", "HAINAN", "BONAIRE", "KAVERI", "KABINI", "HAWAII",
    "MULLINS", "TOPAZ", "TONGA", "FIJI", "CARRIZO", "STONEY", "POLARIS10", "POLARIS11", "POLARIS12",
    "VEGAM", "VEGA10", "VEGA12", "VEGA20", "RAVEN", "RENOIR", "ARCTURUS", "NAVI10", "NAVI12",
    "NAVI14",
];

/// Identifies the driver and GPU generation from the context strings.
#[must_use]
pub fn classify(vendor: &str, renderer: &str, version: &str) -> Classification {
    let version_tokens: Vec<&str> = version.split(' ').collect();
    let version_after = |marker: &str| Version::after_token(version, marker).unwrap_or_default();
    let mut c = Classification::default();

    // Mesa classic drivers
    if renderer.starts_with("Mesa DRI R") {
        // "Mesa DRI R600 (RV740 94B3) 20090101 x86/MMX/SSE2 TCL DRI2"
        let tokens: Vec<&str> = renderer.split(' ').collect();
        c.chipset = tokens
            .get(3)
            .map(|t| t.trim_start_matches('(').to_string())
            .unwrap_or_default();
        c.driver = match tokens.get(2).copied() {
            Some("R100") => Driver::R100,
            Some("R200") => Driver::R200,
            Some("R300") => Driver::R300C,
            Some("R600") => Driver::R600C,
            _ => Driver::Unknown,
        };
        c.chip_class = detect_radeon_class(&c.chipset);
    } else if renderer.contains("Intel") {
        let chipset = if renderer.starts_with("Intel(R) Integrated Graphics Device") {
            "IGD"
        } else {
            renderer
        };
        c.driver = Driver::Intel;
        c.chip_class = detect_intel_class(chipset);
    }
    // Proprietary drivers
    else if vendor == "ATI Technologies Inc." {
        c.chip_class = detect_radeon_class(renderer);
        c.driver = Driver::Catalyst;
        c.driver_version = match version_tokens.get(2) {
            Some(t) if t.starts_with('(') => Version::parse(version_tokens[1]),
            _ => version_tokens.first().map(|t| Version::parse(t)).unwrap_or_default(),
        };
    } else if vendor == "NVIDIA Corporation" {
        c.chip_class = detect_nvidia_class(renderer);
        c.driver = Driver::NVidia;
        c.driver_version = version_after("NVIDIA");
    } else if vendor == "Qualcomm" {
        c.driver = Driver::Qualcomm;
        c.chip_class = detect_qualcomm_class(renderer);
    } else if renderer.contains("Panfrost") {
        c.driver = Driver::Panfrost;
        c.chip_class = detect_panfrost_class(renderer);
    } else if renderer.contains("Mali") {
        c.driver = Driver::Lima;
        c.chip_class = detect_lima_class(renderer);
    } else if renderer.starts_with("VC4 ") {
        c.driver = Driver::VC4;
        c.chip_class = if renderer.contains("2.1") {
            ChipClass::VideoCoreIV
        } else {
            ChipClass::UnknownVideoCore4
        };
    } else if renderer.starts_with("V3D ") {
        c.driver = Driver::V3D;
        c.chip_class = if renderer.contains("4.2") {
            ChipClass::VideoCore3D
        } else {
            ChipClass::UnknownVideoCore3D
        };
    } else if renderer == "Software Rasterizer" {
        c.driver = Driver::Swrast;
    }
    // Virtual hardware
    else if vendor == "Humper" && renderer == "Chromium" {
        c.driver = Driver::VirtualBox;
        c.driver_version = version_after("Chromium");
    }
    // Gallium drivers
    else {
        let tokens: Vec<&str> = renderer.split(' ').collect();
        c.chipset = if renderer.contains("Gallium") {
            // "Gallium 0.4 on AMD RV740"
            match tokens.get(3).copied() {
                Some("AMD" | "ATI") => tokens.get(4),
                _ => tokens.get(3),
            }
        } else {
            tokens.first()
        }
        .map(|s| (*s).to_string())
        .unwrap_or_default();

        if vendor == "X.Org R300 Project" {
            c.chip_class = detect_radeon_class(&c.chipset);
            c.driver = Driver::R300G;
        } else if vendor == "X.Org" && contains_any(renderer, R600G_MARKERS) {
            c.chip_class = detect_radeon_class(&c.chipset);
            c.driver = Driver::R600G;
        } else if (vendor == "X.Org" || vendor == "AMD") && contains_any(renderer, RADEONSI_MARKERS) {
            c.chip_class = detect_radeon_class(renderer);
            c.driver = Driver::RadeonSI;
        } else if vendor == "nouveau" {
            c.chip_class = detect_nvidia_class(&c.chipset);
            c.driver = Driver::Nouveau;
        } else if c.chipset == "softpipe" {
            c.driver = Driver::Softpipe;
        } else if c.chipset == "llvmpipe" {
            c.driver = Driver::Llvmpipe;
        } else if vendor == "VMware, Inc." && c.chipset.contains("SVGA3D") {
            c.driver = Driver::VMware;
        } else if renderer == "virgl" {
            c.driver = Driver::Virgl;
        }
    }

    c
}
