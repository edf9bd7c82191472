pub mod ports;
pub mod transcript_use_case;
