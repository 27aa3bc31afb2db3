//! Rendering of the two files executed on the remote host: the
//! container (re)deploy script and the nginx site config.
//!
//! Everything here is a pure function of its inputs so the output can
//! be previewed with `dockside render` and diffed between runs.

use std::fmt::Write;

/// Remote directory that receives the artifacts and build context.
pub const STAGING_DIR: &str = "/tmp/dockside";

/// Webroot served for ACME HTTP-01 challenges.
pub const ACME_WEBROOT: &str = "/var/www/certbot";

pub const NGINX_SITES_AVAILABLE: &str = "/etc/nginx/sites-available";
pub const NGINX_SITES_ENABLED: &str = "/etc/nginx/sites-enabled";

/// Generated text artifacts for one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployArtifacts {
    pub deploy_script: String,
    pub nginx_config: String,
}

/// Remote names and paths that follow from the derived name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLayout {
    pub container: String,
    pub image: String,
    pub build_context: String,
    pub script_path: String,
    pub nginx_upload_path: String,
    pub site_available: String,
    pub site_enabled: String,
}

impl RemoteLayout {
    #[must_use]
    pub fn new(derived_name: &str) -> Self {
        Self {
            container: container_name(derived_name),
            image: image_tag(derived_name),
            build_context: format!("{STAGING_DIR}/{derived_name}"),
            script_path: format!("{STAGING_DIR}/deploy-{derived_name}.sh"),
            nginx_upload_path: format!("{STAGING_DIR}/{derived_name}.nginx.conf"),
            site_available: format!("{NGINX_SITES_AVAILABLE}/{derived_name}"),
            site_enabled: format!("{NGINX_SITES_ENABLED}/{derived_name}"),
        }
    }
}

#[must_use]
pub fn container_name(derived_name: &str) -> String {
    format!("{derived_name}-container")
}

#[must_use]
pub fn image_tag(derived_name: &str) -> String {
    format!("{derived_name}:latest")
}

/// Render both artifacts.
///
/// ```
/// use dockside::artifacts::render;
///
/// let a = render("myapp", 8080, "example.com");
///
/// assert!(a.deploy_script.contains("-p 127.0.0.1:8080:8080"));
/// assert!(a.nginx_config.contains("server_name example.com www.example.com;"));
/// ```
#[must_use]
pub fn render(derived_name: &str, app_port: u16, domain_name: &str) -> DeployArtifacts {
    DeployArtifacts {
        deploy_script: render_deploy_script(derived_name, app_port),
        nginx_config: render_nginx_config(app_port, domain_name),
    }
}

/// Stop and remove the previous container, build the image from the
/// uploaded build context, and start a fresh container bound to
/// loopback only. nginx is the sole public entry point.
#[must_use]
pub fn render_deploy_script(derived_name: &str, app_port: u16) -> String {
    let layout = RemoteLayout::new(derived_name);
    let container = &layout.container;
    let image = &layout.image;
    let context = &layout.build_context;

    let mut s = String::new();
    let _ = writeln!(s, "#!/usr/bin/env bash");
    let _ = writeln!(s, "# Generated by dockside for {derived_name}. Regenerated on every deploy.");
    let _ = writeln!(s, "set -euo pipefail");
    let _ = writeln!(s);
    let _ = writeln!(s, "echo \"Stopping {container} (if running)...\"");
    let _ = writeln!(s, "docker stop {container} >/dev/null 2>&1 || true");
    let _ = writeln!(s, "docker rm {container} >/dev/null 2>&1 || true");
    let _ = writeln!(s);
    let _ = writeln!(s, "echo \"Building image {image}...\"");
    let _ = writeln!(s, "docker build -t {image} {context}");
    let _ = writeln!(s);
    let _ = writeln!(s, "echo \"Starting {container} on 127.0.0.1:{app_port}...\"");
    let _ = writeln!(
        s,
        "docker run -d --name {container} --restart unless-stopped \
         -p 127.0.0.1:{app_port}:{app_port} {image}"
    );
    s
}

/// A single `server` block on port 80 proxying to the loopback-bound
/// container, with the ACME challenge path served from disk.
#[must_use]
pub fn render_nginx_config(app_port: u16, domain_name: &str) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "server {{");
    let _ = writeln!(s, "    listen 80;");
    let _ = writeln!(s, "    server_name {domain_name} www.{domain_name};");
    let _ = writeln!(s);
    let _ = writeln!(s, "    location /.well-known/acme-challenge/ {{");
    let _ = writeln!(s, "        root {ACME_WEBROOT};");
    let _ = writeln!(s, "    }}");
    let _ = writeln!(s);
    let _ = writeln!(s, "    location / {{");
    let _ = writeln!(s, "        proxy_pass http://localhost:{app_port};");
    let _ = writeln!(s, "        proxy_set_header Host $host;");
    let _ = writeln!(s, "        proxy_set_header X-Real-IP $remote_addr;");
    let _ = writeln!(s, "        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;");
    let _ = writeln!(s, "    }}");
    let _ = writeln!(s, "}}");
    s
}
