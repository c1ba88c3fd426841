// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Common data model shared between the Cachet backend and server.

pub mod events;
pub mod identifiers;
pub mod material;

pub const DEFAULT_PORT_HTTP: u16 = 9420;

/// Page size used by `get_messages` when the client does not request one.
/// Doubles as the upper bound for client-requested page sizes.
pub const MESSAGE_PAGE_LIMIT: i64 = 50;

/// Upper bound on `per_page` for user search.
pub const SEARCH_PAGE_LIMIT: i64 = 50;

/// Minimum length of a user search query.
pub const SEARCH_QUERY_MIN_LEN: usize = 2;
