//! Middleware chain and executor.
//!
//! A [`Middleware`] wraps the next [`HandlerFunc`] and returns a new handler.
//! Most sources call `next` first and then write their values, so their
//! writes land after everything further down the chain:
//!
//! ```text
//! execute(schema, values, vec![flags, env, files, defaults])
//!
//! flags ──► env ──► files ──► defaults ──► identity
//!   writes happen on the way back: defaults, files, env, flags
//! ```
//!
//! The first middleware passed to [`execute`] therefore has the highest
//! precedence. A middleware that does its work before calling `next` inverts
//! this for itself.

use crate::error::LayerfigError;
use crate::schema::Schema;
use crate::values::Values;

pub type HandlerFunc = Box<dyn Fn(&mut Schema, &mut Values) -> Result<(), LayerfigError>>;

pub type Middleware = Box<dyn FnOnce(HandlerFunc) -> HandlerFunc>;

/// The handler at the bottom of every chain.
pub fn identity() -> HandlerFunc {
    Box::new(|_, _| Ok(()))
}

/// Compose `middlewares` into one, first element outermost (same ordering as
/// [`execute`]).
pub fn chain(middlewares: Vec<Middleware>) -> Middleware {
    Box::new(move |next| wrap(next, middlewares))
}

pub(crate) fn wrap(next: HandlerFunc, middlewares: Vec<Middleware>) -> HandlerFunc {
    middlewares
        .into_iter()
        .rev()
        .fold(next, |handler, middleware| middleware(handler))
}

/// Run `middlewares` against a private copy of `schema`, writing into `values`.
///
/// Errors abort the chain; writes made before the failure stay in `values`.
pub fn execute(
    schema: &Schema,
    values: &mut Values,
    middlewares: Vec<Middleware>,
) -> Result<(), LayerfigError> {
    let mut schema = schema.clone();
    let handler = wrap(identity(), middlewares);
    handler(&mut schema, values)
}

/// A middleware that calls `next` first, then runs `f`.
pub fn after_next<F>(f: F) -> Middleware
where
    F: Fn(&mut Schema, &mut Values) -> Result<(), LayerfigError> + 'static,
{
    Box::new(move |next: HandlerFunc| -> HandlerFunc {
        Box::new(move |schema, values| {
            next(schema, values)?;
            f(schema, values)
        })
    })
}

/// A middleware that runs `f` before calling `next`.
pub fn before_next<F>(f: F) -> Middleware
where
    F: Fn(&mut Schema, &mut Values) -> Result<(), LayerfigError> + 'static,
{
    Box::new(move |next: HandlerFunc| -> HandlerFunc {
        Box::new(move |schema, values| {
            f(schema, values)?;
            next(schema, values)
        })
    })
}
