pub mod attribute;
pub mod ber;
pub mod codec;
pub mod config;
pub mod error;
pub mod escape;
pub mod filter;
pub mod matcher;
pub mod parser;
pub mod traverse;

pub use attribute::{test_values, AttributeValue, Record, Scalar};
pub use config::{Config, OutputFormat};
pub use error::{FilterError, Result};
pub use escape::{escape, unescape};
pub use filter::{
    AttributeValueAssertion, ExtensibleFilter, Filter, FilterKind, SubstringFilter, Substrings,
};
pub use matcher::{Matcher, UnsupportedMatcher};
pub use parser::parse;
