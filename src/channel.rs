//! Channel engine (C3, §4.3): a pull-based double-buffer state machine so
//! a consumer byte-stream never blocks when the next buffer can be
//! prefetched, modeled as a pure `transition(state, event) -> (state,
//! effects)` function in the style of the teacher's `event_loop.rs`
//! state-machine/effect-dispatch idiom.

use bytes::Bytes;

use crate::error::XdError;

/// Pull state of one channel (exact names/order per the component design
/// table in §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullState {
    Open,
    Preload,
    OneConv,
    OneRead,
    Pull2nd,
    TwoConv,
    TwoRead,
}

/// Events that drive the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Caller asks the channel to start prefetching.
    Preload,
    /// A requested buffer arrived from the provider.
    RxArrived,
    /// A raw buffer finished directory conversion (no-op for
    /// non-directory providers, but still a state step).
    Converted,
    /// Caller consumed the current buffer and asked for the next pull.
    Advanced,
    /// Caller drained the current buffer to empty.
    DrainEmpty,
}

/// An effect the caller must carry out as a result of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    None,
    IssuePullFirst,
    IssuePullSecond,
    RunConverter,
    SwitchBuffersAndPull,
}

/// Pure transition function: `(state, event) -> (state, effect)`.
/// Mirrors the table in §4.3 exactly; any event not meaningful in a
/// given state is rejected rather than silently ignored, since an
/// out-of-order call is a caller bug.
pub fn transition(state: PullState, event: Event) -> Result<(PullState, Effect), XdError> {
    use Event::*;
    use PullState::*;

    let result = match (state, event) {
        (Open, Preload) => (Preload, Effect::IssuePullFirst),
        (Preload, RxArrived) => (OneConv, Effect::RunConverter),
        (OneConv, Converted) => (OneRead, Effect::None),
        (OneRead, Advanced) => (Pull2nd, Effect::IssuePullSecond),
        (Pull2nd, RxArrived) => (TwoConv, Effect::RunConverter),
        (TwoConv, Converted) => (TwoRead, Effect::None),
        (TwoRead, DrainEmpty) => (OneRead, Effect::SwitchBuffersAndPull),
        _ => {
            return Err(XdError::MalformedPacket {
                reason: format!("event {:?} is not valid in state {:?}", event, state),
            })
        }
    };
    Ok(result)
}

/// One channel's buffered halves (§4.3's "a channel owns two data
/// buffers").
#[derive(Debug, Clone, Default)]
pub struct DoubleBuffer {
    pub first: Bytes,
    pub second: Bytes,
    pub active_is_first: bool,
}

/// A single open channel: pull state plus its double buffer and
/// last-error cell (§5's resource policy: channels are a bounded pool).
pub struct Channel {
    pub id: u8,
    pub state: PullState,
    pub buffers: DoubleBuffer,
    pub last_error: u8,
    pub charset: Charset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Petscii,
    Ascii,
}

impl Channel {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            state: PullState::Open,
            buffers: DoubleBuffer::default(),
            last_error: 0,
            charset: Charset::Petscii,
        }
    }

    pub fn step(&mut self, event: Event) -> Result<Effect, XdError> {
        let (next, effect) = transition(self.state, event)?;
        self.state = next;
        Ok(effect)
    }
}

/// A bounded pool of channels (`MAX_CHANNELS`, 8 per §5).
pub const MAX_CHANNELS: usize = 8;

pub struct ChannelPool {
    slots: Vec<Option<Channel>>,
}

impl ChannelPool {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_CHANNELS).map(|_| None).collect(),
        }
    }

    pub fn open(&mut self, id: u8) -> Result<(), XdError> {
        let free = self.slots.iter().position(Option::is_none);
        match free {
            Some(idx) => {
                self.slots[idx] = Some(Channel::new(id));
                Ok(())
            }
            None => Err(XdError::NoChannel { max: MAX_CHANNELS }),
        }
    }

    pub fn find_mut(&mut self, id: u8) -> Result<&mut Channel, XdError> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|c| c.id == id)
            .ok_or(XdError::ChannelNotFound { channel: id as i8 })
    }

    pub fn close(&mut self, id: u8) {
        for slot in &mut self.slots {
            if slot.as_ref().map(|c| c.id) == Some(id) {
                *slot = None;
            }
        }
    }
}

impl Default for ChannelPool {
    fn default() -> Self {
        Self::new()
    }
}
