//! # Vendor lookup
//!
//! IEEE hands out MAC blocks of three sizes: MA-L (24-bit prefix), MA-M (28-bit)
//! and MA-S (36-bit). [`OuiTable`] keeps one map per block size and checks the
//! longest prefix first, then falls back to the `mac_oui` database bundled into
//! the binary. A lookup never fails; an unknown prefix is [`UNKNOWN_VENDOR`].

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::Context;
use lantopo_common::model::UNKNOWN_VENDOR;
use lantopo_common::network::mac;
use mac_oui::Oui;
use pnet::util::MacAddr;
use tracing::{debug, warn};

pub trait VendorRepository: Send + Sync {
    fn get_vendor(&self, mac: MacAddr) -> Option<String>;

    /// Vendor name, or `"Unknown"`.
    fn vendor_or_unknown(&self, mac: Option<MacAddr>) -> String {
        mac.and_then(|mac| self.get_vendor(mac))
            .unwrap_or_else(|| UNKNOWN_VENDOR.to_string())
    }
}

static OUI_DB: OnceLock<Option<Oui>> = OnceLock::new();

fn get_oui_db() -> Option<&'static Oui> {
    OUI_DB
        .get_or_init(|| match Oui::default() {
            Ok(db) => Some(db),
            Err(e) => {
                warn!("bundled OUI database unavailable: {e:?}");
                None
            }
        })
        .as_ref()
}

/// The `mac_oui` database compiled into the binary (24-bit prefixes only).
pub struct MacOuiRepo;

impl VendorRepository for MacOuiRepo {
    fn get_vendor(&self, mac: MacAddr) -> Option<String> {
        let db: &Oui = get_oui_db()?;
        match db.lookup_by_mac(&mac.to_string()) {
            Ok(Some(entry)) => Some(entry.company_name.clone()),
            _ => None,
        }
    }
}

/// Longest-match table built from IEEE registry exports.
#[derive(Default)]
pub struct OuiTable {
    ma_l: HashMap<u64, String>,
    ma_m: HashMap<u64, String>,
    ma_s: HashMap<u64, String>,
    fallback: Option<Box<dyn VendorRepository>>,
}

impl OuiTable {
    /// A table that only consults the bundled database.
    pub fn bundled() -> Self {
        Self {
            fallback: Some(Box::new(MacOuiRepo)),
            ..Default::default()
        }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn VendorRepository>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Loads every registry file; an unreadable file is logged and skipped.
    pub fn load_files<P: AsRef<Path>>(&mut self, paths: &[P]) {
        for path in paths {
            let path: &Path = path.as_ref();
            match fs::read_to_string(path).with_context(|| format!("reading {}", path.display())) {
                Ok(text) => {
                    let added: usize = self.load_registry(&text);
                    debug!(path = %path.display(), added, "loaded OUI registry");
                }
                Err(e) => warn!("{e:#}"),
            }
        }
    }

    /// Parses IEEE registry text and returns the number of prefixes added.
    ///
    /// ```text
    /// 28-6F-B9   (hex)        Nokia Shanghai Bell Co., Ltd.      <- MA-L
    /// 70-B3-D5   (hex)        Acme                               <- MA-S header
    /// 4C0000-4C0FFF     (base 16)        Acme                    <- 36-bit block
    /// ```
    pub fn load_registry(&mut self, text: &str) -> usize {
        let mut added: usize = 0;
        let mut pending: Option<(u64, String)> = None;

        for line in text.lines() {
            if let Some((prefix, vendor)) = line.split_once("(hex)") {
                if let Some((oui, name)) = pending.take() {
                    self.ma_l.insert(oui, name);
                    added += 1;
                }
                if let Some(oui) = parse_hex(&prefix.trim().replace('-', ""))
                    && !vendor.trim().is_empty()
                {
                    pending = Some((oui, vendor.trim().to_string()));
                }
            } else if let Some((range, vendor)) = line.split_once("(base 16)")
                && let Some((start, end)) = range.trim().split_once('-')
                && let Some((oui, _)) = pending.as_ref()
            {
                let (Some(start), Some(end)) = (parse_hex(start.trim()), parse_hex(end.trim()))
                else {
                    continue;
                };
                let vendor: String = vendor.trim().to_string();
                match end - start.min(end) {
                    0x0F_FFFF => {
                        self.ma_m.insert((oui << 4) | (start >> 20), vendor);
                    }
                    0x00_0FFF => {
                        self.ma_s.insert((oui << 12) | (start >> 12), vendor);
                    }
                    _ => continue,
                }
                pending = None;
                added += 1;
            }
        }
        if let Some((oui, name)) = pending {
            self.ma_l.insert(oui, name);
            added += 1;
        }
        added
    }

    pub fn len(&self) -> usize {
        self.ma_l.len() + self.ma_m.len() + self.ma_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VendorRepository for OuiTable {
    fn get_vendor(&self, mac: MacAddr) -> Option<String> {
        let bits: u64 = mac::to_u64(&mac);
        self.ma_s
            .get(&(bits >> 12))
            .or_else(|| self.ma_m.get(&(bits >> 20)))
            .or_else(|| self.ma_l.get(&(bits >> 24)))
            .cloned()
            .or_else(|| self.fallback.as_ref()?.get_vendor(mac))
    }
}

fn parse_hex(s: &str) -> Option<u64> {
    u64::from_str_radix(s, 16).ok()
}

const VENDOR_ABBREV: &[(&str, &str)] = &[
    ("AVM Audiovisuelles Marketing und Computersysteme GmbH", "AVM"),
    ("Hangzhou BroadLink Technology Co.,Ltd", "BroadLink"),
    ("Salcomp (Shenzhen) CO., LTD.", "Salcomp"),
    ("GL Technologies (Hong Kong) Limited", "GL.iNet"),
    ("REALTEK SEMICONDUCTOR CORP.", "Realtek"),
    ("Shenzhen Ogemray Technology Co.,Ltd", "Ogemray"),
    ("StreamUnlimited Engineering GmbH", "StreamUnlimited"),
    ("Espressif Inc.", "Espressif"),
    ("Raspberry Pi Trading Ltd", "Raspberry Pi"),
    ("Raspberry Pi (Trading) Ltd", "Raspberry Pi"),
    ("NETGEAR", "Netgear"),
    ("Ubiquiti Inc", "Ubiquiti"),
    ("TP-LINK TECHNOLOGIES CO.,LTD.", "TP-Link"),
    ("Super Micro Computer, Inc.", "Supermicro"),
    ("Grandstream Networks, Inc.", "Grandstream"),
    ("Google, Inc.", "Google"),
    ("Samsung Electronics Co.,Ltd", "Samsung"),
    ("Philips Lighting BV", "Philips Hue"),
    ("Nabu Casa, Inc.", "Nabu Casa"),
    ("Nuki Home Solutions GmbH", "Nuki"),
    ("HUMAX Co., Ltd.", "HUMAX"),
    ("Hewlett Packard", "HP"),
    ("HP Inc.", "HP"),
    ("Brother Industries, LTD.", "Brother"),
    ("Intel Corporate", "Intel"),
    ("D&M Holdings Inc.", "Denon/Marantz"),
    ("iRobot Corporation", "iRobot"),
    ("Weinzierl Engineering GmbH", "Weinzierl"),
    ("Fa. GIRA", "GIRA"),
    ("Cisco Systems, Inc", "Cisco"),
    ("UGREEN GROUP LIMITED", "Ugreen"),
    ("Part II Research, Inc.", "Part II"),
    ("snom technology GmbH", "snom"),
    ("Climax Technology Co. Ltd", "Climax"),
];

/// Short vendor name for diagram labels.
pub fn abbreviate(vendor: &str) -> &str {
    VENDOR_ABBREV
        .iter()
        .find(|(full, _)| *full == vendor)
        .map_or(vendor, |(_, short)| *short)
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
