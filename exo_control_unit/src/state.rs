//! State machines of the controller.
//!
//! Two composed machines, each with its own transition table:
//!
//! 1. **Activation** - outer lifecycle of the control state (entry, ticking, exit)
//! 2. **Mode selector** - inner controller mode, switched only by parameter updates

pub mod activation;
pub mod mode;
