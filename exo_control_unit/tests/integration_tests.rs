//! Integration tests for the EXO control unit.
//!
//! These tests drive the controller through real `DriveJoint`s over the
//! loopback and simulated transports, spanning configuration, mode
//! switching, calibration and shutdown.

mod integration;
