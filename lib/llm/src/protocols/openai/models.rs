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

use serde::{Deserialize, Serialize};

/// Response body of `GET /v1/models`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModelList {
    /// Always "list"
    pub object: String,
    pub data: Vec<ModelMetaData>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModelMetaData {
    /// Model's ID - must be unique
    pub id: String,

    /// Always "model"
    pub object: String,

    /// Unix timestamp of when the model was registered with the service
    /// See <https://en.wikipedia.org/wiki/Unix_time>
    pub created: u64,

    /// Name of user or group that owns the model
    pub owned_by: String,
}

impl ModelList {
    pub fn new(data: Vec<ModelMetaData>) -> Self {
        ModelList {
            object: "list".to_string(),
            data,
        }
    }
}

impl ModelMetaData {
    pub fn new(id: impl Into<String>, created: u64) -> Self {
        ModelMetaData {
            id: id.into(),
            object: "model".to_string(),
            created,
            owned_by: "ember".to_string(),
        }
    }
}
