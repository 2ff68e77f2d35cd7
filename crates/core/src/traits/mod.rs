//! Core traits for the voice agent system.
//!
//! - `TelephonyProvider`/`SmsProvider`: duck-typed provider clients (C4).
//! - `Store`: the durable storage seam used by the session runtime, job
//!   fabric, and tool engine (L0).

mod telephony;
mod store;

pub use telephony::{
    TelephonyProvider, SmsProvider, PlaceCallRequest, PlaceCallResponse, SendSmsRequest,
};
pub use store::Store;
