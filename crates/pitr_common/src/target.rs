//! Recovery targets.

use crate::codes::PITR_INVALID_ARGS;
use crate::errors::{PitrError, PitrResult};
use crate::timefmt::normalize_time;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static LSN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9A-Fa-f]+/[0-9A-Fa-f]+$").unwrap());

/// Raw target selection as given on the command line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFlags {
    pub default: bool,
    pub immediate: bool,
    pub time: Option<String>,
    pub name: Option<String>,
    pub lsn: Option<String>,
    pub xid: Option<String>,
}

fn given(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl TargetFlags {
    fn count(&self) -> usize {
        [
            self.default,
            self.immediate,
            given(&self.time).is_some(),
            given(&self.name).is_some(),
            given(&self.lsn).is_some(),
            given(&self.xid).is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }
}

/// Where recovery should stop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum RecoveryTarget {
    /// Replay to the end of the archived WAL stream
    Latest,
    /// Stop as soon as the backup is consistent
    Immediate,
    /// Normalized timestamp
    Time(String),
    /// Named restore point
    Name(String),
    Lsn(String),
    Xid(u32),
}

impl RecoveryTarget {
    /// Validate flags; exactly one target must be selected.
    /// Time values are normalized with the local offset.
    pub fn from_flags(flags: &TargetFlags) -> PitrResult<Self> {
        Self::from_flags_with(flags, normalize_time)
    }

    pub fn from_flags_with(flags: &TargetFlags, normalize: impl Fn(&str) -> String) -> PitrResult<Self> {
        match flags.count() {
            0 => {
                return Err(PitrError::new(PITR_INVALID_ARGS, "recovery target required")
                    .with_detail("use one of --default, --immediate, --time, --name, --lsn, --xid"))
            }
            1 => {}
            _ => {
                return Err(PitrError::new(PITR_INVALID_ARGS, "only one recovery target may be specified")
                    .with_detail("--default, --immediate, --time, --name, --lsn and --xid are mutually exclusive"))
            }
        }

        if flags.default {
            return Ok(RecoveryTarget::Latest);
        }
        if flags.immediate {
            return Ok(RecoveryTarget::Immediate);
        }
        if let Some(time) = given(&flags.time) {
            return Ok(RecoveryTarget::Time(normalize(time)));
        }
        if let Some(name) = given(&flags.name) {
            return Ok(RecoveryTarget::Name(name.to_string()));
        }
        if let Some(lsn) = given(&flags.lsn) {
            if !LSN.is_match(lsn) {
                return Err(PitrError::new(PITR_INVALID_ARGS, format!("invalid LSN format: {lsn}"))
                    .with_detail("expected hex/hex, e.g. 0/7C82CB8"));
            }
            return Ok(RecoveryTarget::Lsn(lsn.to_string()));
        }
        if let Some(xid) = given(&flags.xid) {
            return match xid.parse::<u32>() {
                Ok(n) if n > 0 => Ok(RecoveryTarget::Xid(n)),
                _ => Err(PitrError::new(PITR_INVALID_ARGS, format!("invalid XID: {xid}"))
                    .with_detail("expected a positive 32-bit transaction id")),
            };
        }
        Err(PitrError::new(PITR_INVALID_ARGS, "recovery target required"))
    }

    /// Human-readable description used in plans and results
    pub fn describe(&self) -> String {
        match self {
            RecoveryTarget::Latest => "Latest (end of WAL stream)".to_string(),
            RecoveryTarget::Immediate => "Backup consistency point".to_string(),
            RecoveryTarget::Time(t) => format!("Time: {t}"),
            RecoveryTarget::Name(n) => format!("Restore point: {n}"),
            RecoveryTarget::Lsn(l) => format!("LSN: {l}"),
            RecoveryTarget::Xid(x) => format!("XID: {x}"),
        }
    }

    /// pgBackRest `--type`/`--target` arguments. Latest adds none.
    pub fn backrest_args(&self) -> Vec<String> {
        match self {
            RecoveryTarget::Latest => vec![],
            RecoveryTarget::Immediate => vec!["--type=immediate".to_string()],
            RecoveryTarget::Time(t) => vec!["--type=time".to_string(), format!("--target={t}")],
            RecoveryTarget::Name(n) => vec!["--type=name".to_string(), format!("--target={n}")],
            RecoveryTarget::Lsn(l) => vec!["--type=lsn".to_string(), format!("--target={l}")],
            RecoveryTarget::Xid(x) => vec!["--type=xid".to_string(), format!("--target={x}")],
        }
    }
}

impl fmt::Display for RecoveryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(s: &str) -> String {
        s.to_string()
    }

    fn flags_from_mask(mask: u8) -> TargetFlags {
        TargetFlags {
            default: mask & 1 != 0,
            immediate: mask & 2 != 0,
            time: (mask & 4 != 0).then(|| "2025-01-01 00:00:00+00".to_string()),
            name: (mask & 8 != 0).then(|| "before_migration".to_string()),
            lsn: (mask & 16 != 0).then(|| "0/7C82CB8".to_string()),
            xid: (mask & 32 != 0).then(|| "1234".to_string()),
        }
    }

    #[test]
    fn test_exactly_one_target_over_all_combinations() {
        for mask in 0u8..64 {
            let result = RecoveryTarget::from_flags_with(&flags_from_mask(mask), ident);
            if mask.count_ones() == 1 {
                assert!(result.is_ok(), "mask {mask:06b} should be accepted");
            } else {
                let err = result.unwrap_err();
                assert_eq!(err.code, PITR_INVALID_ARGS, "mask {mask:06b}");
            }
        }
    }

    #[test]
    fn test_blank_values_do_not_count() {
        let flags = TargetFlags {
            immediate: true,
            name: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(RecoveryTarget::from_flags_with(&flags, ident).unwrap(), RecoveryTarget::Immediate);
    }

    #[test]
    fn test_lsn_validation() {
        let ok = TargetFlags { lsn: Some("16/B374D848".to_string()), ..Default::default() };
        assert_eq!(
            RecoveryTarget::from_flags_with(&ok, ident).unwrap(),
            RecoveryTarget::Lsn("16/B374D848".to_string())
        );
        for bad in ["16B374D848", "0/XYZ", "/1", "1/"] {
            let flags = TargetFlags { lsn: Some(bad.to_string()), ..Default::default() };
            assert!(RecoveryTarget::from_flags_with(&flags, ident).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_xid_validation() {
        let ok = TargetFlags { xid: Some("4294967295".to_string()), ..Default::default() };
        assert_eq!(RecoveryTarget::from_flags_with(&ok, ident).unwrap(), RecoveryTarget::Xid(u32::MAX));
        for bad in ["0", "-1", "4294967296", "abc"] {
            let flags = TargetFlags { xid: Some(bad.to_string()), ..Default::default() };
            let err = RecoveryTarget::from_flags_with(&flags, ident).unwrap_err();
            assert_eq!(err.code, PITR_INVALID_ARGS, "{bad}");
        }
    }

    #[test]
    fn test_time_goes_through_normalizer() {
        let flags = TargetFlags { time: Some("2025-01-01".to_string()), ..Default::default() };
        let target = RecoveryTarget::from_flags_with(&flags, |t| format!("{t} 00:00:00+08")).unwrap();
        assert_eq!(target, RecoveryTarget::Time("2025-01-01 00:00:00+08".to_string()));
    }

    #[test]
    fn test_backrest_args() {
        assert!(RecoveryTarget::Latest.backrest_args().is_empty());
        assert_eq!(RecoveryTarget::Immediate.backrest_args(), vec!["--type=immediate"]);
        assert_eq!(
            RecoveryTarget::Name("rp1".to_string()).backrest_args(),
            vec!["--type=name", "--target=rp1"]
        );
        assert_eq!(RecoveryTarget::Xid(42).backrest_args(), vec!["--type=xid", "--target=42"]);
    }

    #[test]
    fn test_describe() {
        assert_eq!(RecoveryTarget::Latest.describe(), "Latest (end of WAL stream)");
        assert_eq!(RecoveryTarget::Immediate.describe(), "Backup consistency point");
        assert_eq!(RecoveryTarget::Lsn("0/1".to_string()).describe(), "LSN: 0/1");
    }
}
