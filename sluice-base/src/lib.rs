mod accumulator;
mod block;
mod comparator;
mod endian;
mod error;
mod tuple;

pub use accumulator::{Accumulator, IntSumAccumulator, LastWriteWinsAccumulator};
pub use block::{Block, BlockPool};
pub use comparator::{Comparator, Lexicographic, LengthPrefixedString, Reversed};
pub use endian::Endian;
pub use error::{config_error, err, invariant, Error, ErrorKind, Result};
pub use tuple::{partition_of, Tuple, TupleRef};
