//! A headless music player for Plex Media Server.
//!
//! # Overview
//!
//! * [`account`] pairs with a plex.tv account and lists its servers.
//! * [`resolver`] finds a working address for a server among the candidates
//!   plex.tv advertises, racing them and remembering the winner in a
//!   [`store`].
//! * [`server`] browses the libraries of a media server.
//! * [`player`] plays a [`queue`] of tracks through a [`session`] on an audio
//!   [`output`], topping the queue up with [`shuffle`] if asked to.
//!
//! # Example
//!
//! ```rust
//! let http_client = Arc::new(http::Client::new(&config)?);
//! let account = Account::new(Arc::clone(&http_client))?;
//! let servers = account.servers(&token).await?;
//!
//! let library = Arc::new(MediaServer::new(Arc::clone(&http_client)));
//! let resolver = Resolver::new(Arc::clone(&library), store, config.probe_timeout);
//! let resolved = resolver.resolve(&servers[0], &token).await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate log;

pub mod account;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod output;
pub mod player;
pub mod protocol;
pub mod queue;
pub mod resolver;
pub mod server;
pub mod session;
pub mod shuffle;
pub mod store;
pub mod token;

#[cfg(test)]
mod testing;
