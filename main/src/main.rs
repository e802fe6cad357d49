/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

#![warn(rust_2018_idioms)]
#![warn(rust_2021_compatibility)]
#![deny(
    dead_code,
    nonstandard_style,
    unused_imports,
    unused_mut,
    unused_variables,
    unused_unsafe,
    unreachable_patterns
)]

use clap::Parser;
use eyre::WrapErr as _;

use cpu_utils::CPUTopology;
use cpu_utils::CpuInfo;
use rdt_config::init_tracing;
use rdt_config::load_config;
use rdt_control::global;
use rdt_control::RdtApi;
use rdt_control::RdtError;
use rdt_control::RdtResult;

/// Room for the largest class of service tables seen on real platforms.
const MAX_CLASSES: usize = 256;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long)]
    config_path: String,

    /// Also print the class of service of every logical core.
    #[arg(long)]
    cores: bool,
}

fn main() -> eyre::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config_path.as_str())?;

    init_tracing(&config.logs)?;
    tracing_log::LogTracer::init()?;

    tracing::info!("starting with config {config:?}");
    let cpu_info = CPUTopology::new()
        .and_then(|topology| topology.cpu_info())
        .wrap_err("reading CPU topology failed")?;

    let api = global();
    api.init_with_cpu_info(&config, cpu_info.clone())
        .wrap_err("RDT control initialization failed")?;

    let result = print_state(api, &cpu_info, args.cores);
    api.fini().wrap_err("RDT control shutdown failed")?;
    result
}

fn print_state(api: &RdtApi, cpu_info: &CpuInfo, with_cores: bool) -> eyre::Result<()> {
    for socket in cpu_info.sockets() {
        match skip_unsupported(api.l3ca_get(socket, MAX_CLASSES))? {
            Some(allocations) => {
                for allocation in allocations {
                    println!(
                        "socket {socket} L3 COS{}: {:?}",
                        allocation.class_id, allocation.mask
                    );
                }
            }
            None => println!("socket {socket}: L3 allocation isn't available"),
        }

        if let Some(allocations) = skip_unsupported(api.mba_get(socket, MAX_CLASSES))? {
            for allocation in allocations {
                println!(
                    "socket {socket} MBA COS{}: {}%",
                    allocation.class_id, allocation.mb_rate
                );
            }
        }
    }

    if with_cores {
        for core_id in cpu_info.core_ids() {
            let class_id = api
                .alloc_assoc_get(core_id)
                .wrap_err_with(|| format!("reading class of core {core_id} failed"))?;
            println!("core {core_id}: COS{class_id}");
        }
    }

    Ok(())
}

/// Backend failures, e.g. a technology missing on the platform, don't stop the report.
fn skip_unsupported<T>(result: RdtResult<T>) -> eyre::Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(RdtError::Backend(error)) => {
            tracing::warn!("{error}");
            Ok(None)
        }
        Err(error) => Err(error.into()),
    }
}
