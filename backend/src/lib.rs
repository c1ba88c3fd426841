// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Server-side core of the Cachet end-to-end encrypted chat service.
//!
//! The backend never touches plaintext or unwrapped key material. It
//! authenticates users, keeps the membership and key-version state of rooms,
//! stores per-recipient wrapped keys and ciphertext messages, and hands the
//! transport layer everything it needs for fan-out.

pub mod auth_service;
pub mod errors;
pub mod rooms;
pub mod service;
pub mod settings;
