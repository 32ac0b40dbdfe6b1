//! Numeric outcome codes.
//!
//! Every outcome carries a six digit code `MMCCNN`: module, category and a
//! module-specific number. The category alone decides the process exit code.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Module prefixes (the `MM` part, already scaled)
pub const MODULE_PG: u32 = 130000;
pub const MODULE_PB: u32 = 140000;
pub const MODULE_PITR: u32 = 160000;
pub const MODULE_CONFIG: u32 = 900000;
pub const MODULE_SYSTEM: u32 = 990000;

/// Error category, the `CC` part of a code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Success,
    Param,
    Permission,
    Dependency,
    Network,
    Resource,
    State,
    Config,
    Operation,
    Internal,
    Other(u32),
}

impl Category {
    fn from_digit(value: u32) -> Self {
        match value {
            0 => Category::Success,
            1 => Category::Param,
            2 => Category::Permission,
            3 => Category::Dependency,
            4 => Category::Network,
            5 => Category::Resource,
            6 => Category::State,
            7 => Category::Config,
            8 => Category::Operation,
            9 => Category::Internal,
            n => Category::Other(n),
        }
    }

    /// Process exit code for this category
    pub fn exit_code(self) -> i32 {
        match self {
            Category::Success => 0,
            Category::Param => 2,
            Category::Permission => 3,
            Category::Dependency => 4,
            Category::Network => 5,
            Category::Resource => 6,
            Category::State => 9,
            Category::Config => 8,
            Category::Operation | Category::Internal | Category::Other(_) => 1,
        }
    }
}

/// An outcome code. Zero means success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Code(pub i64);

impl Code {
    pub const SUCCESS: Code = Code(0);

    pub const fn new(module: u32, category: u32, specific: u32) -> Self {
        Code((module + category * 100 + specific) as i64)
    }

    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    pub fn category(self) -> Category {
        if self.0 < 0 {
            return Category::Other(u32::MAX);
        }
        Category::from_digit(((self.0 % 10000) / 100) as u32)
    }

    /// Map a code to a process exit status. Total: negative and unknown
    /// categories fall back to 1.
    pub fn exit_code(self) -> i32 {
        if self.0 == 0 {
            return 0;
        }
        self.category().exit_code()
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// PITR orchestration
pub const PITR_INVALID_ARGS: Code = Code::new(MODULE_PITR, 1, 1);
pub const PITR_NO_BACKUP: Code = Code::new(MODULE_PITR, 3, 1);
pub const PITR_PRECHECK_FAILED: Code = Code::new(MODULE_PITR, 6, 1);
pub const PITR_PG_RUNNING: Code = Code::new(MODULE_PITR, 6, 2);
pub const PITR_STOP_FAILED: Code = Code::new(MODULE_PITR, 8, 1);
pub const PITR_RESTORE_FAILED: Code = Code::new(MODULE_PITR, 8, 2);
pub const PITR_START_FAILED: Code = Code::new(MODULE_PITR, 8, 3);
pub const PITR_POST_FAILED: Code = Code::new(MODULE_PITR, 8, 4);
pub const PITR_START_TIMEOUT: Code = Code::new(MODULE_PITR, 8, 5);

// PostgreSQL control
pub const PG_INVALID_ARGS: Code = Code::new(MODULE_PG, 1, 1);
pub const PG_NOT_RUNNING: Code = Code::new(MODULE_PG, 6, 5);
pub const PG_ALREADY_PRIMARY: Code = Code::new(MODULE_PG, 6, 7);
pub const PG_PROMOTE_FAILED: Code = Code::new(MODULE_PG, 8, 7);

// pgBackRest
pub const PB_INVALID_BACKUP_TYPE: Code = Code::new(MODULE_PB, 1, 1);
pub const PB_NOT_PRIMARY: Code = Code::new(MODULE_PB, 6, 1);
pub const PB_PG_NOT_RUNNING: Code = Code::new(MODULE_PB, 6, 2);
pub const PB_CONFIG_NOT_FOUND: Code = Code::new(MODULE_PB, 7, 1);
pub const PB_BACKUP_FAILED: Code = Code::new(MODULE_PB, 8, 2);

// Configuration and system
pub const CONFIG_INVALID: Code = Code::new(MODULE_CONFIG, 7, 1);
pub const SYSTEM_INVALID_ARGS: Code = Code::new(MODULE_SYSTEM, 1, 1);
pub const SYSTEM_COMMAND_FAILED: Code = Code::new(MODULE_SYSTEM, 8, 1);
