pub const JSON_EXTENSION: &str = "json";
pub const CSV_EXTENSION: &str = "csv";

pub const CSV_DELIMITER: char = ',';
pub const CSV_COMMENT: char = '#';
/// First header column of a transition CSV.
pub const CSV_TIME_COLUMN: &str = "Time [s]";
/// Comment key carrying the sample rate, e.g. `# sample_rate_hz=4000000`.
pub const CSV_SAMPLE_RATE_KEY: &str = "sample_rate_hz";
