//! Pointing portal media commands at the profile's HLS service

use serde_json::Value;
use url::Url;

use crate::catalog::ChannelCatalog;

/// Where rewritten commands send players
#[derive(Debug, Clone)]
pub struct RewriteTarget {
    pub hls_port: u16,
}

impl RewriteTarget {
    /// `ffmpeg http://<host>:<hls port>/iptv/<key>`
    pub fn cmd_for(&self, host: &str, key: &str) -> String {
        format!(
            "ffmpeg http://{}:{}/iptv/{}",
            host,
            self.hls_port,
            urlencoding::encode(key)
        )
    }

    /// Channel key of a command produced by [`RewriteTarget::cmd_for`], if
    /// it points at this HLS port.
    pub fn key_from_cmd(&self, cmd: &str) -> Option<String> {
        let url = Url::parse(cmd.split_whitespace().last()?).ok()?;
        if url.port_or_known_default() != Some(self.hls_port) {
            return None;
        }
        let key = url.path().strip_prefix("/iptv/")?;
        urlencoding::decode(key).ok().map(|k| k.into_owned())
    }

    /// Rewrite `js.data[*].cmd` and `js.data[*].cmds[*].url` of a channel
    /// listing for every entry the catalog knows. Returns the number of
    /// entries rewritten.
    pub fn rewrite_listing(&self, listing: &mut Value, catalog: &ChannelCatalog, host: &str) -> usize {
        let Some(entries) = listing
            .get_mut("js")
            .and_then(|js| js.get_mut("data"))
            .and_then(Value::as_array_mut)
        else {
            return 0;
        };

        let mut rewritten = 0;
        for entry in entries.iter_mut() {
            let by_name = entry
                .get("name")
                .and_then(Value::as_str)
                .and_then(|name| catalog.get(name.trim()));
            let channel = by_name.or_else(|| {
                entry
                    .get("cmd")
                    .and_then(Value::as_str)
                    .and_then(|cmd| catalog.get_by_cmd(cmd))
            });
            let Some(channel) = channel else {
                continue;
            };

            let cmd = self.cmd_for(host, channel.key());
            if let Some(obj) = entry.as_object_mut() {
                obj.insert("cmd".to_string(), Value::String(cmd.clone()));
                if let Some(cmds) = obj.get_mut("cmds").and_then(Value::as_array_mut) {
                    for item in cmds.iter_mut().filter_map(Value::as_object_mut) {
                        if item.contains_key("url") {
                            item.insert("url".to_string(), Value::String(cmd.clone()));
                        }
                    }
                }
                rewritten += 1;
            }
        }
        rewritten
    }
}
