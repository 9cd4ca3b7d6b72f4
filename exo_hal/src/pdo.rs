//! PDO mapping.
//!
//! Each mapping is written as the fixed six-step SDO sequence:
//!
//! 1. disable the COB-ID (bit 31 set) in the communication object
//! 2. clear the mapping count
//! 3. write one entry per mapped register
//! 4. write the mapping count
//! 5. write the transmission type
//! 6. re-enable the COB-ID
//!
//! Mapping entries are `index << 16 | subindex << 8 | bit_length`.

use exo_common::drive::{DataType, Register};

use crate::codec::{ObjectDictionaryCodec, Request, SdoValue};
use crate::vendor::AddressMap;

const COB_ID_INVALID: u32 = 0x8000_0000;

/// Transmission type: synchronous, every SYNC.
pub const TRANSMISSION_SYNC: u8 = 0x01;
/// Transmission type: event driven (manufacturer specific).
pub const TRANSMISSION_EVENT: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdoDirection {
    /// Drive → master.
    Transmit,
    /// Master → drive.
    Receive,
}

/// One PDO of the fixed mapping table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdoMapping {
    /// Label used in error reports.
    pub step: &'static str,
    pub direction: PdoDirection,
    /// PDO number, 1..=4.
    pub number: u8,
    pub registers: &'static [Register],
    pub transmission_type: u8,
}

/// The drive layer's fixed mapping: three TPDOs, four RPDOs, configured in this order.
pub const STANDARD_MAPPINGS: [PdoMapping; 7] = [
    PdoMapping {
        step: "TPDO1 status word",
        direction: PdoDirection::Transmit,
        number: 1,
        registers: &[Register::StatusWord],
        transmission_type: TRANSMISSION_EVENT,
    },
    PdoMapping {
        step: "TPDO2 position/velocity",
        direction: PdoDirection::Transmit,
        number: 2,
        registers: &[Register::ActualPos, Register::ActualVel],
        transmission_type: TRANSMISSION_SYNC,
    },
    PdoMapping {
        step: "TPDO3 torque",
        direction: PdoDirection::Transmit,
        number: 3,
        registers: &[Register::ActualTor],
        transmission_type: TRANSMISSION_SYNC,
    },
    PdoMapping {
        step: "RPDO1 control word",
        direction: PdoDirection::Receive,
        number: 1,
        registers: &[Register::ControlWord],
        transmission_type: TRANSMISSION_EVENT,
    },
    PdoMapping {
        step: "RPDO2 target position",
        direction: PdoDirection::Receive,
        number: 2,
        registers: &[Register::TargetPos],
        transmission_type: TRANSMISSION_EVENT,
    },
    PdoMapping {
        step: "RPDO3 target velocity",
        direction: PdoDirection::Receive,
        number: 3,
        registers: &[Register::TargetVel],
        transmission_type: TRANSMISSION_EVENT,
    },
    PdoMapping {
        step: "RPDO4 target torque",
        direction: PdoDirection::Receive,
        number: 4,
        registers: &[Register::TargetTor],
        transmission_type: TRANSMISSION_EVENT,
    },
];

impl PdoMapping {
    /// Communication parameter object (0x1800+n-1 / 0x1400+n-1).
    pub const fn communication_index(&self) -> u16 {
        let base = match self.direction {
            PdoDirection::Transmit => 0x1800,
            PdoDirection::Receive => 0x1400,
        };
        base + (self.number as u16 - 1)
    }

    /// Mapping parameter object (0x1A00+n-1 / 0x1600+n-1).
    pub const fn mapping_index(&self) -> u16 {
        let base = match self.direction {
            PdoDirection::Transmit => 0x1A00,
            PdoDirection::Receive => 0x1600,
        };
        base + (self.number as u16 - 1)
    }

    /// Default COB-ID for this PDO on `node_id`.
    pub const fn cob_id(&self, node_id: u8) -> u32 {
        let base = match self.direction {
            PdoDirection::Transmit => 0x180,
            PdoDirection::Receive => 0x200,
        };
        base + (self.number as u32 - 1) * 0x100 + node_id as u32
    }

    /// Encoded mapping entry for `register`.
    pub fn entry(register: Register, addresses: &AddressMap) -> u32 {
        (addresses.address(register) as u32) << 16
            | (addresses.subindex(register) as u32) << 8
            | register.data_type().bit_length() as u32
    }

    /// Ordered SDO writes configuring this PDO.
    pub fn requests(&self, codec: &ObjectDictionaryCodec, addresses: &AddressMap) -> Vec<Request> {
        let comm = self.communication_index();
        let map = self.mapping_index();
        let cob_id = self.cob_id(codec.node_id());

        let mut requests = Vec::with_capacity(self.registers.len() + 5);
        requests.push(codec.write_request(
            comm,
            1,
            DataType::U32,
            SdoValue::Hex(COB_ID_INVALID | cob_id),
        ));
        requests.push(codec.write_request(map, 0, DataType::U8, SdoValue::Dec(0)));
        for (i, &register) in self.registers.iter().enumerate() {
            requests.push(codec.write_request(
                map,
                i as u8 + 1,
                DataType::U32,
                SdoValue::Hex(Self::entry(register, addresses)),
            ));
        }
        requests.push(codec.write_request(
            map,
            0,
            DataType::U8,
            SdoValue::Dec(self.registers.len() as i64),
        ));
        requests.push(codec.write_request(
            comm,
            2,
            DataType::U8,
            SdoValue::Hex(self.transmission_type as u32),
        ));
        requests.push(codec.write_request(comm, 1, DataType::U32, SdoValue::Hex(cob_id)));
        requests
    }
}
