/// Name of the file (inside the data directory) that stores schemas of all tables.
pub const METADATA_FILE_NAME: &str = "metadata.json";
