use std::path::{Component, PathBuf, Prefix};

/// `fs::canonicalize` hands back `\\?\C:\...` and `\\?\UNC\server\share`;
/// bucket names use the conventional spelling.
pub fn strip_verbatim_prefix(path: PathBuf) -> PathBuf {
    let mut components = path.components();
    let rebuilt = match components.next() {
        Some(Component::Prefix(prefix)) => match prefix.kind() {
            Prefix::VerbatimDisk(letter) => {
                let mut out = PathBuf::from(format!("{}:\\", letter as char));
                for component in components.skip_while(|c| matches!(c, Component::RootDir)) {
                    out.push(component.as_os_str());
                }
                Some(out)
            }
            Prefix::VerbatimUNC(server, share) => {
                let mut out = PathBuf::from(format!(
                    r"\\{}\{}\",
                    server.to_string_lossy(),
                    share.to_string_lossy()
                ));
                for component in components.skip_while(|c| matches!(c, Component::RootDir)) {
                    out.push(component.as_os_str());
                }
                Some(out)
            }
            _ => None,
        },
        _ => None,
    };
    rebuilt.unwrap_or(path)
}
