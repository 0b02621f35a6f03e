// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains everything needed for the cyclic motion session of the arms.
pub mod channel;
pub mod conversion;
pub mod io_service;
pub mod types;
