//! Google Calendar integration for calnotify.
//!
//! Provides the Calendar API client and the `CalendarSource` boundary
//! the event store polls.

pub mod client;
pub mod error;
pub mod source;
pub mod types;

pub use client::CalendarClient;
pub use error::{CalendarError, FetchError};
pub use source::{CalendarSource, GoogleCalendarSource, TimeWindow};
pub use types::{AccessRole, Calendar, Event, EventKey, EventStatus, EventTime};
