/*
 * 5D Labs Agent Platform - Horizontal Scaling Action Executor
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::doc_markdown)]

//! Horizontal scaling action executor
//!
//! This crate carries out "provision" and "unbind" recommendations against a live
//! Kubernetes cluster by changing the replica count of the controller that owns the
//! targeted pod. Scale-out actions additionally wait for the new pod to appear and hand
//! it to a placement component before the action is reported as executed.

pub mod action;
pub mod broker;
pub mod cluster;
pub mod config;
pub mod error;
pub mod mutator;
pub mod placement;
pub mod resolver;
pub mod scaler;
pub mod server;
pub mod watch;

// Re-export commonly used types
pub use action::{
    ActionItem, ActionItemType, ActionRecord, ActionRegistry, EntityType, ParentObjectRef,
    ScaleSpec, TargetObject, TurboAction, TurboActionStatus, TurboActionType,
};
pub use broker::{InMemoryPodBroker, PodBroker, PodSubscription};
pub use cluster::{ClusterClient, ClusterError, KubeCluster};
pub use config::ExecutorConfig;
pub use error::{ErrorClass, ExecutorError};
pub use placement::{BindingPlacer, PlacementError, PodPlacer};
pub use scaler::HorizontalScaler;
