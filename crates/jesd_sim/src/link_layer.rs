//! Link-layer encoder boundary and a synchronization-handshake model.
//!
//! The link-layer protocol is an external collaborator; the core only holds
//! each lane's encoder in reset until the serializers are up, feeds it the
//! synchronized JSYNC and the device-synchronous JREF, and folds its `ready`
//! into the aggregate status. [`SyncHandshake`] is the behavioral model used
//! when no encoder is supplied: code-group synchronization, a fixed-length
//! initial lane alignment sequence started on a multiframe boundary, then
//! payload pass-through.

use serde::Serialize;

use crate::transport::LaneWord;

/// K28.5, the code-group synchronization comma.
pub const K28_5: u8 = 0xBC;
/// K28.0, marks the start of an alignment multiframe.
pub const K28_0: u8 = 0x1C;
/// K28.3, marks the end of an alignment multiframe.
pub const K28_3: u8 = 0x7C;

/// Inputs a link-layer encoder samples on every device tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkInputs {
    /// Hold the encoder in reset.
    pub reset: bool,
    /// Synchronization request line (high = synchronized).
    pub jsync: bool,
    /// Device-synchronous multiframe reference.
    pub jref: bool,
}

/// One lane's link-layer encoder, clocked by the device domain.
pub trait LinkLayer {
    /// Advances one device tick and returns the encoded word.
    fn tick(&mut self, inputs: LinkInputs, payload: u32) -> LaneWord;

    /// `true` once the encoder is passing payload.
    fn ready(&self) -> bool;
}

/// Handshake position of a [`SyncHandshake`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HandshakeState {
    /// Held in reset.
    Reset,
    /// Code-group synchronization: sending commas, waiting for JSYNC.
    Cgs,
    /// Initial lane alignment sequence.
    Ilas,
    /// Passing payload.
    Data,
}

/// Behavioral link-layer model.
#[derive(Debug, Clone)]
pub struct SyncHandshake {
    state: HandshakeState,
    multiframe_cycles: u64,
    ilas_cycles: u64,
    lmfc: u64,
    ilas_count: u64,
    jref_prev: bool,
}

impl SyncHandshake {
    /// Creates an encoder with the given multiframe length and ILAS length,
    /// both in device cycles.
    pub fn new(multiframe_cycles: u64, ilas_cycles: u64) -> Self {
        Self {
            state: HandshakeState::Reset,
            multiframe_cycles: multiframe_cycles.max(1),
            ilas_cycles,
            lmfc: 0,
            ilas_count: 0,
            jref_prev: false,
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    fn ilas_word(&self) -> LaneWord {
        let position = self.ilas_count % self.multiframe_cycles;
        if position == 0 {
            LaneWord::k_chars(K28_0)
        } else if position + 1 == self.multiframe_cycles {
            LaneWord::k_chars(K28_3)
        } else {
            LaneWord::data(position as u32)
        }
    }
}

impl LinkLayer for SyncHandshake {
    fn tick(&mut self, inputs: LinkInputs, payload: u32) -> LaneWord {
        // JREF rising edge realigns the local multiframe clock.
        let lmfc_boundary = if inputs.jref && !self.jref_prev {
            self.lmfc = 0;
            true
        } else {
            self.lmfc = (self.lmfc + 1) % self.multiframe_cycles;
            self.lmfc == 0
        };
        self.jref_prev = inputs.jref;

        if inputs.reset {
            self.state = HandshakeState::Reset;
            return LaneWord::default();
        }

        match self.state {
            HandshakeState::Reset => {
                self.state = HandshakeState::Cgs;
                LaneWord::k_chars(K28_5)
            }
            HandshakeState::Cgs => {
                if inputs.jsync && lmfc_boundary {
                    self.state = HandshakeState::Ilas;
                    self.ilas_count = 0;
                }
                LaneWord::k_chars(K28_5)
            }
            HandshakeState::Ilas if !inputs.jsync => {
                self.state = HandshakeState::Cgs;
                LaneWord::k_chars(K28_5)
            }
            HandshakeState::Ilas => {
                let word = self.ilas_word();
                self.ilas_count += 1;
                if self.ilas_count >= self.ilas_cycles {
                    self.state = HandshakeState::Data;
                }
                word
            }
            HandshakeState::Data if !inputs.jsync => {
                self.state = HandshakeState::Cgs;
                LaneWord::k_chars(K28_5)
            }
            HandshakeState::Data => LaneWord::data(payload),
        }
    }

    fn ready(&self) -> bool {
        self.state == HandshakeState::Data
    }
}
