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

//! Context Module
//!
//! [`Context`] wraps a request on its way into an engine. It owns an [`Arc<Controller>`] whose id
//! is the request id; the same controller is handed back with the response stream, which is how
//! a consumer tells the producer to stop.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch::{channel, Receiver, Sender};

use super::{AsyncEngineContext, AsyncEngineContextProvider, Data};

pub struct Context<T: Data> {
    current: T,
    controller: Arc<Controller>,
}

impl<T: Send + Sync + 'static> Context<T> {
    /// Wrap a request with a fresh controller and a random id.
    pub fn new(current: T) -> Self {
        Context {
            current,
            controller: Arc::new(Controller::default()),
        }
    }

    pub fn with_id(current: T, id: impl Into<String>) -> Self {
        Context {
            current,
            controller: Arc::new(Controller::new(id.into())),
        }
    }

    pub fn id(&self) -> &str {
        self.controller.id()
    }

    pub fn controller(&self) -> Arc<Controller> {
        self.controller.clone()
    }

    /// Move the context onto a new value, returning the previous one.
    pub fn transfer<U: Send + Sync + 'static>(self, new_current: U) -> (T, Context<U>) {
        (
            self.current,
            Context {
                current: new_current,
                controller: self.controller,
            },
        )
    }

    /// Separate the request from its context.
    pub fn into_parts(self) -> (T, Context<()>) {
        self.transfer(())
    }

    pub fn map<U: Send + Sync + 'static, F>(self, f: F) -> Context<U>
    where
        F: FnOnce(T) -> U,
    {
        let (current, ctx) = self.transfer(());
        ctx.transfer(f(current)).1
    }
}

impl<T: Data> std::fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.controller.id())
            .finish()
    }
}

impl<T: Data> Deref for Context<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.current
    }
}

impl<T: Data> DerefMut for Context<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.current
    }
}

impl<T> From<T> for Context<T>
where
    T: Send + Sync + 'static,
{
    fn from(current: T) -> Self {
        Context::new(current)
    }
}

impl<T: Data> AsyncEngineContextProvider for Context<T> {
    fn context(&self) -> Arc<dyn AsyncEngineContext> {
        self.controller.clone()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum State {
    Live,
    Stopped,
    Killed,
}

/// A context implementation with cancellation propagation.
///
/// The state only moves forward: `Live -> Stopped -> Killed`.
#[derive(Debug)]
pub struct Controller {
    id: String,
    tx: Sender<State>,
    rx: Receiver<State>,
}

impl Controller {
    pub fn new(id: String) -> Self {
        let (tx, rx) = channel(State::Live);
        Self { id, tx, rx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn advance(&self, next: State) {
        self.tx.send_if_modified(|state| {
            let moved = match (*state, next) {
                (State::Live, State::Stopped | State::Killed) => true,
                (State::Stopped, State::Killed) => true,
                _ => false,
            };
            if moved {
                *state = next;
            }
            moved
        });
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }
}

#[async_trait]
impl AsyncEngineContext for Controller {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_stopped(&self) -> bool {
        *self.rx.borrow() != State::Live
    }

    fn is_killed(&self) -> bool {
        *self.rx.borrow() == State::Killed
    }

    async fn stopped(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|state| *state != State::Live).await;
    }

    async fn killed(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|state| *state == State::Killed).await;
    }

    fn stop_generating(&self) {
        self.advance(State::Stopped);
    }

    fn kill(&self) {
        self.advance(State::Killed);
    }
}
