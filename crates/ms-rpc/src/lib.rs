/// Transport requête/réponse symétrique sur TCP.
///
/// Le coordinateur et chaque worker font tourner un [`RpcServer`] et
/// tiennent un [`RpcClient`] vers leur pair. Les messages sont des
/// corps bincode préfixés par leur longueur (u32 big-endian) ; le
/// dispatch route chaque [`wire::Request`] entrant vers le
/// [`Handler`] du serveur.

pub mod client;
mod codec;
pub mod error;
pub mod server;
pub mod wire;

pub use client::RpcClient;
pub use error::RpcError;
pub use server::{Handler, RpcServer};
pub use wire::{CallError, Request, Response};
