//! Drive vendor variants.
//!
//! A vendor decides three things: object-dictionary address overrides,
//! the PDO mapping subindex of the torque target, and the exact control
//! word sequences used to enter each control mode.

use exo_common::drive::{ControlWord, MotorProfile, Register};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Drive families with distinct object dictionaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveVendor {
    /// Plain CiA 402 addresses; profile position uses a set-point handshake.
    #[default]
    Standard,
    /// Kinco servo drives.
    Kinco,
}

impl DriveVendor {
    /// Registers whose address differs from the CiA 402 default.
    pub const fn address_overrides(self) -> &'static [(Register, u16)] {
        match self {
            Self::Standard => &[],
            Self::Kinco => &[(Register::ActualTor, 0x6078), (Register::TargetTor, 0x60F6)],
        }
    }

    /// Subindex used when mapping or addressing `register`.
    pub const fn subindex(self, register: Register) -> u8 {
        match (self, register) {
            (Self::Kinco, Register::TargetTor) => 0x08,
            _ => 0x00,
        }
    }

    /// Control word closing the position-mode batch, if the vendor needs one.
    ///
    /// Kinco "instant position": set-points take effect without a handshake.
    pub fn instant_position_word(self) -> Option<ControlWord> {
        match self {
            Self::Kinco => Some(
                ControlWord::ENABLE
                    | ControlWord::NEW_SET_POINT
                    | ControlWord::CHANGE_SET_IMMEDIATELY
                    | ControlWord::VENDOR_BIT_12,
            ),
            Self::Standard => None,
        }
    }

    /// Whether a position target must be latched with a new set-point pulse.
    pub const fn needs_set_point_confirm(self) -> bool {
        matches!(self, Self::Standard)
    }
}

impl fmt::Display for DriveVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Kinco => f.write_str("kinco"),
        }
    }
}

/// Per-drive register → object index table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressMap {
    vendor: DriveVendor,
    addresses: BTreeMap<Register, u16>,
}

impl AddressMap {
    /// Defaults plus the vendor's overrides.
    pub fn for_vendor(vendor: DriveVendor) -> Self {
        let mut addresses: BTreeMap<Register, u16> = Register::ALL
            .iter()
            .map(|&r| (r, r.default_address()))
            .collect();
        for &(register, address) in vendor.address_overrides() {
            addresses.insert(register, address);
        }
        Self { vendor, addresses }
    }

    pub fn vendor(&self) -> DriveVendor {
        self.vendor
    }

    /// Object index for `register`.
    pub fn address(&self, register: Register) -> u16 {
        self.addresses
            .get(&register)
            .copied()
            .unwrap_or(register.default_address())
    }

    pub fn subindex(&self, register: Register) -> u8 {
        self.vendor.subindex(register)
    }

    /// Reverse lookup; used by the simulated gateway.
    pub fn register_at(&self, address: u16) -> Option<Register> {
        self.addresses
            .iter()
            .find(|&(_, &a)| a == address)
            .map(|(&r, _)| r)
    }

    /// Replace an address; configuration overrides land here.
    pub fn set(&mut self, register: Register, address: u16) {
        self.addresses.insert(register, address);
    }
}

/// Profile values written by position and velocity mode initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveProfiles {
    pub position: MotorProfile,
    pub velocity: MotorProfile,
}
