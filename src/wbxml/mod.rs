//! EAS WBXML codec. See `spec.md` §6 and the GLOSSARY entry for WBXML.

pub mod codec;
pub mod documents;
pub mod tags;

pub use codec::Node;
