// SPDX-FileCopyrightText: 2026 Andrew Gunnerson
// SPDX-License-Identifier: GPL-3.0-only

use std::{
    process::ExitCode,
    sync::atomic::{AtomicBool, Ordering},
};

use tracing::error;

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

fn main() -> ExitCode {
    match nxfirm::cli::args::main(&LOGGING_INITIALIZED) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let kind = nxfirm::error::classify(&e)
                .map(|k| format!("[{k}] "))
                .unwrap_or_default();

            if LOGGING_INITIALIZED.load(Ordering::SeqCst) {
                error!("{kind}{e:?}");
            } else {
                eprintln!("{kind}{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
