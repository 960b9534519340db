//! Reverse-proxy configuration shipped with every archive.

/// Default document root.
pub const DEFAULT_ROOT_DIR: &str = "/var/www/html";

/// Minimal nginx virtual host serving the unpacked archive.
///
/// The server name is the domain without scheme or path, or `_` when none is
/// known. Unknown paths fall back to `index.html`.
#[must_use]
pub fn nginx_config(domain: Option<&str>, root_dir: Option<&str>) -> String {
    let server_name = domain.map(server_name).unwrap_or_default();
    let server_name = if server_name.is_empty() {
        "_"
    } else {
        server_name
    };
    let root_dir = root_dir
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_ROOT_DIR);

    format!(
        "server {{\n\
         \tlisten 80;\n\
         \tserver_name {server_name};\n\
         \n\
         \troot {root_dir};\n\
         \tindex index.html;\n\
         \n\
         \tlocation / {{\n\
         \t\ttry_files $uri $uri/ $uri.html /index.html;\n\
         \t}}\n\
         }}\n"
    )
}

fn server_name(domain: &str) -> &str {
    let domain = domain.trim();
    let lower = domain.to_ascii_lowercase();
    let rest = if lower.starts_with("https://") {
        &domain[8..]
    } else if lower.starts_with("http://") {
        &domain[7..]
    } else {
        domain
    };
    rest.split('/').next().unwrap_or_default().trim()
}
