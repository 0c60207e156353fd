//! Trending-list scrapers.
//!
//! Every source runs its upstream strategies through a
//! [`FetchChain`](crate::chain::FetchChain) and normalizes the result into
//! [`TrendingItem`](crate::models::TrendingItem)s. A source that cannot reach
//! any upstream still answers, with a single placeholder item.
//!
//! # Supported Sources
//!
//! | Source | Module | Strategies |
//! |--------|--------|------------|
//! | Bilibili ranking | [`bilibili`] | WBI-signed ranking v2, legacy ranking |
//! | Bilibili popular | [`bilibili`] | popular API, cached |
//! | WeRead ranking | [`weread`] | category book list |
//! | Weibo hot search | [`weibo`] | mobile container API, simplified query |
//! | Hupu hot threads | [`hupu`] | board HTML, homepage HTML, list API |

pub mod bilibili;
pub mod hupu;
pub mod weibo;
pub mod weread;
