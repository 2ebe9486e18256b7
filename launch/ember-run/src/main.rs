// SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::Parser;

use ember_run::Flags;
use ember_runtime::{logging, RuntimeConfig};

fn main() -> anyhow::Result<()> {
    logging::init();
    let flags = Flags::parse();

    // max_worker_threads and max_blocking_threads from env vars or config file.
    let rt_config = RuntimeConfig::from_settings()?;
    let runtime = rt_config.create_runtime()?;

    runtime.block_on(ember_run::run(flags))
}
