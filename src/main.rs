// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Proteus-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Proteus and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Proteus server entrypoint.
//!
//! Serves the diagram persistence API over HTTP at `http://127.0.0.1:<port>/`,
//! backed by a single SQLite file.

use std::error::Error;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 27461;
const DEFAULT_DB_PATH: &str = "proteus.db";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} [<db-path>] [--port <port>]\n  {program} [--db <path>] [--port <port>]\n\nServes the diagram API at `http://127.0.0.1:<port>/`.\n--port selects the port (0 = ephemeral; default {DEFAULT_PORT}).\n\nIf db-path/--db is omitted, `{DEFAULT_DB_PATH}` in the current working directory is used."
    );
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct CliOptions {
    db_path: Option<String>,
    port: Option<u16>,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let mut options = CliOptions::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--db" => {
                if options.db_path.is_some() {
                    return Err(());
                }
                let path = args.next().ok_or(())?;
                options.db_path = Some(path);
            }
            "--port" => {
                if options.port.is_some() {
                    return Err(());
                }
                let raw = args.next().ok_or(())?;
                let port: u16 = raw.parse().map_err(|_| ())?;
                options.port = Some(port);
            }
            _ if arg.starts_with('-') => return Err(()),
            _ => {
                if options.db_path.is_some() {
                    return Err(());
                }
                options.db_path = Some(arg);
            }
        }
    }

    Ok(options)
}

fn main() {
    let result = (|| -> Result<(), Box<dyn Error>> {
        let mut args = std::env::args();
        let program = args.next().unwrap_or_else(|| "proteus".to_owned());

        let options = match parse_options(args) {
            Ok(options) => options,
            Err(()) => {
                print_usage(&program);
                std::process::exit(2);
            }
        };

        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new("proteus=info")),
            )
            .init();

        let db_path = options.db_path.unwrap_or_else(|| DEFAULT_DB_PATH.to_owned());
        let port = options.port.unwrap_or(DEFAULT_PORT);

        let store = Arc::new(proteus::store::DiagramStore::open(&db_path)?);
        store.ensure_registry_exists()?;
        let router = proteus::api::router(proteus::api::AppState::new(store));

        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
            tracing::info!(
                addr = %listener.local_addr()?,
                db_path = %db_path,
                "serving diagram API"
            );
            axum::serve(listener, router).await?;
            Ok::<(), Box<dyn Error>>(())
        })?;

        Ok(())
    })();

    if let Err(err) = result {
        eprintln!("proteus: {err}");
        std::process::exit(1);
    }
}
