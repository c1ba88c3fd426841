// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire envelope of the realtime gateway.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Inbound frames decode into [`client::ClientEvent`], outbound frames are
//! serialized from [`server::ServerEvent`]. Unknown payload fields are
//! ignored; a missing required field or an unknown event name is a decode
//! error which the gateway answers with an `error` event.

pub mod client;
pub mod server;
