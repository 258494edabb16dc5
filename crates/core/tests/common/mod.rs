//! DSL for building test histories over `&'static str` objects and `u64`
//! values.
//!
//! ```ignore
//! let h = hist(vec![
//!     txn!(1 => committed [w(x, 1), r(y, 2)]),
//!     txn!(2 => committed @ (0, 10) [w(y, 2)]),   // with start/commit stamps
//!     txn!(3 => aborted [w(z, 9)]),
//! ]);
//! ```
//!
//! - `w(var, val)` → `Operation::write`
//! - `r(var, val)` → `Operation::read`
//! - `r(var)`      → `Operation::read_absent`

use adya_core::history::types::Transaction;
use adya_core::history::History;

/// Build a single operation.
#[macro_export]
macro_rules! op {
    (w($var:ident, $val:expr)) => {
        adya_core::history::types::Operation::<&'static str, u64>::write(
            stringify!($var),
            $val as u64,
        )
    };
    (r($var:ident, $val:expr)) => {
        adya_core::history::types::Operation::<&'static str, u64>::read(
            stringify!($var),
            $val as u64,
        )
    };
    (r($var:ident)) => {
        adya_core::history::types::Operation::<&'static str, u64>::read_absent(stringify!($var))
    };
}

/// Build a transaction with an outcome, optional stamps, and operations.
#[macro_export]
macro_rules! txn {
    ($id:expr => committed [ $($e:ident($($args:tt)*)),* $(,)? ]) => {
        adya_core::history::types::Transaction::committed(
            $id,
            vec![$($crate::op!($e($($args)*))),*],
        )
    };
    ($id:expr => committed @ ($start:expr, $commit:expr) [ $($e:ident($($args:tt)*)),* $(,)? ]) => {
        adya_core::history::types::Transaction::committed(
            $id,
            vec![$($crate::op!($e($($args)*))),*],
        )
        .stamped($start, $commit)
    };
    ($id:expr => aborted [ $($e:ident($($args:tt)*)),* $(,)? ]) => {
        adya_core::history::types::Transaction::aborted(
            $id,
            vec![$($crate::op!($e($($args)*))),*],
        )
    };
    ($id:expr => unknown [ $($e:ident($($args:tt)*)),* $(,)? ]) => {
        adya_core::history::types::Transaction::unknown(
            $id,
            vec![$($crate::op!($e($($args)*))),*],
        )
    };
}

/// Build a validated history from transactions.
#[allow(dead_code)]
pub fn hist(txns: Vec<Transaction<&'static str, u64>>) -> History<&'static str, u64> {
    History::new(txns).expect("test history must be well-formed")
}
