//! Streaming chat core of the CESAME client.
//!
//! Resolves a durable thread per workspace, streams assistant answers over
//! Server-Sent Events with cooperative cancellation, and reconciles finished
//! exchanges into a locally cached history.

// Interdiction stricte de pratiques dangereuses ou non idiomatiques
#![deny(unsafe_code)] // Le code unsafe est interdit
#![warn(missing_docs)] // Toute fonction, struct, enum ou module public doit être documenté
#![warn(dead_code)] // Le code inutilisé est signalé
#![deny(non_camel_case_types)]
// Les types doivent suivre la convention CamelCase (exception explicite possible au besoin)

// Options supplémentaires pour ne rien laisser passer
#![warn(unused_imports)] // Les imports inutilisés sont signalés
#![warn(unused_variables)] // Les variables inutilisées sont signalées
#![deny(unused_must_use)] // Oblige à gérer explicitement les Result et Option
#![deny(non_snake_case)] // Les noms de variables et fonctions doivent être en snake_case
#![deny(non_upper_case_globals)] // Les constantes et globals doivent être en MAJUSCULE
#![deny(nonstandard_style)] // Empêche tout style de code non standard
#![forbid(unsafe_op_in_unsafe_fn)]
// Interdit l'utilisation d'unsafe même dans une fonction unsafe

// Clippy pour stricte discipline
#![deny(clippy::all)] // Active toutes les lints Clippy standard
#![deny(clippy::pedantic)] // Active les lints très strictes de Clippy
#![deny(clippy::nursery)] // Active les lints expérimentales
#![deny(clippy::unwrap_used)] // Interdit unwrap()
#![deny(clippy::expect_used)] // Interdit expect()
#![deny(clippy::panic)] // Interdit panic!()
#![deny(clippy::print_stdout)] // Interdit println!() en production
#![deny(clippy::todo)] // Interdit les TODO dans le code
#![deny(clippy::unimplemented)] // Interdit les fonctions non implémentées
#![deny(clippy::unwrap_in_result)] // Interdit unwrap() sur Result
#![deny(clippy::module_inception)] // Interdit un module ayant le même nom que le crate
#![deny(clippy::redundant_clone)] // Interdit les clones inutiles
#![deny(clippy::shadow_unrelated)] // Interdit le shadowing de variables non liées
#![deny(clippy::too_many_arguments)] // Limite le nombre d’arguments des fonctions
#![deny(clippy::cognitive_complexity)] // Limite la complexité cognitive des fonctions
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Lints pour sécurité et robustesse
#![deny(overflowing_literals)] // Interdit les littéraux qui débordent

/// REST client: auth, workspaces, history and named threads.
pub mod api;
/// Bearer token supply.
pub mod auth;
/// Config, errors, identifiers and the message model.
pub mod core;
/// History reconciliation.
pub mod history;
/// Demo backend (axum).
#[allow(clippy::missing_errors_doc, clippy::unused_async)]
pub mod server;
/// Session orchestration for one workspace.
pub mod session;
/// Entry helpers for the binaries.
pub mod start_cesame_chat;
/// Persistence collaborator.
pub mod storage;
/// SSE chat streaming.
pub mod stream;
/// Per-workspace thread identity.
pub mod threads;

#[cfg(test)]
mod test_support;

pub use crate::core::{ChatError, ChatMessage, ChatResult, ClientConfig, ThreadId, WorkspaceSlug};
pub use crate::session::{ChatSession, ExchangeOutcome};
pub use crate::stream::{ChatStream, ChatStreamClient, StreamEvent};
