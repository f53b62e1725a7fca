//! Asynchronous side of the tollgate pipeline.
//!
//! This module contains the [`AsyncInterceptor`] trait, whose hooks return
//! futures. Asynchronous interceptors may only be bound to operations
//! declared [`InteractionStyle::Async`](crate::core::metadata::InteractionStyle::Async).
//!
//! [`AsyncInterceptor`]: async_interceptor::AsyncInterceptor

pub mod async_interceptor;
