//! Extended M3U generation for a profile's catalog

use crate::catalog::ChannelCatalog;

/// Render the catalog as an extended M3U playlist.
///
/// Channels appear in key order. Stream and logo URLs point back at this
/// server through `host`, the `Host` header of the playlist request.
pub fn render(catalog: &ChannelCatalog, host: &str) -> String {
    let mut m3u = String::from("#EXTM3U\n");

    for channel in catalog.iter() {
        let key = urlencoding::encode(channel.key());
        let name = attribute(channel.name());

        let mut extinf = format!("#EXTINF:-1 tvg-name=\"{name}\"");
        if channel.has_logo() {
            extinf.push_str(&format!(" tvg-logo=\"http://{host}/logo/{key}\""));
        }
        extinf.push_str(&format!(" group-title=\"{}\"", attribute(channel.genre())));
        extinf.push_str(&format!(",{}\n", single_line(channel.name())));

        m3u.push_str(&extinf);
        m3u.push_str(&format!("http://{host}/iptv/{key}\n"));
    }

    m3u
}

// Quotes would end the attribute early
fn attribute(value: &str) -> String {
    single_line(value).replace('"', "'")
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
