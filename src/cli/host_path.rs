use std::path::PathBuf;

pub const HOST_BINARY_NAME: &str = "tabtally-host";

/// The host binary is installed next to the cli.
pub fn to_host_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name(HOST_BINARY_NAME);
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}
