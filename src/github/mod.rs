mod client;
mod clock;
mod link;
mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{Client, Page, RateLimit, MAX_PAGES};
pub use clock::{Clock, SystemClock};
pub use link::next_link;
pub use transport::{HttpResponse, ReqwestTransport, Transport};
