//! Synchronous side of the tollgate pipeline.
//!
//! This module contains the [`Interceptor`] trait, whose hooks complete on
//! the calling stack. Synchronous interceptors may be bound to any operation.
//!
//! [`Interceptor`]: interceptor::Interceptor

pub mod interceptor;
