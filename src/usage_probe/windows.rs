//! Windows consent store backend
//!
//! The CapabilityAccessManager records per-capability, per-consumer usage
//! under HKLM; `LastUsedTimeStop` is a FILETIME that is written when the
//! consumer releases the capability and held at 0 while it is in use.

use super::ConsentLedger;
use crate::error::{Error, Result};
use std::io;
use winreg::enums::HKEY_LOCAL_MACHINE;
use winreg::RegKey;

const CONSENT_STORE_ROOT: &str =
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\CapabilityAccessManager\ConsentStore";
const LAST_USED_STOP: &str = "LastUsedTimeStop";

/// Consent ledger backed by the Windows registry
pub struct RegistryLedger {
    hklm: RegKey,
}

impl RegistryLedger {
    /// Create a ledger over the local machine hive
    pub fn new() -> Self {
        Self {
            hklm: RegKey::predef(HKEY_LOCAL_MACHINE),
        }
    }

    /// Open the registry key for a ledger path, `None` when it does not exist
    fn open(&self, path: &[String]) -> Result<Option<RegKey>> {
        let mut key_path = String::from(CONSENT_STORE_ROOT);
        for segment in path {
            key_path.push('\\');
            key_path.push_str(segment);
        }

        match self.hklm.open_subkey(&key_path) {
            Ok(key) => Ok(Some(key)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Probe(format!("cannot open {}: {}", key_path, e))),
        }
    }
}

impl Default for RegistryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsentLedger for RegistryLedger {
    fn last_used_stop(&self, path: &[String]) -> Result<Option<i64>> {
        let key = match self.open(path)? {
            Some(key) => key,
            None => return Ok(None),
        };

        // REG_QWORD; all-ones encodes the ledger's own "never used" marker
        match key.get_value::<u64, _>(LAST_USED_STOP) {
            Ok(raw) => Ok(Some(raw as i64)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Probe(format!(
                "cannot read {} under {}: {}",
                LAST_USED_STOP,
                path.join("\\"),
                e
            ))),
        }
    }

    fn child_keys(&self, path: &[String]) -> Result<Vec<String>> {
        let key = match self.open(path)? {
            Some(key) => key,
            None => return Ok(Vec::new()),
        };

        key.enum_keys()
            .collect::<io::Result<Vec<String>>>()
            .map_err(|e| {
                Error::Probe(format!(
                    "cannot list subkeys of {}: {}",
                    path.join("\\"),
                    e
                ))
            })
    }
}
