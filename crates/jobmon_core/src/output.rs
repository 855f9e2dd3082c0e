use crate::view_model::HostOutput;

/// Keeps the part of a multi-host Ansible transcript that concerns `host`.
///
/// Blank lines survive so that play sections stay visually separated.
/// `PLAY` and `TASK` headers and the recap are shared by every host.
pub fn filter_host_output(output: &str, host: &str) -> String {
    let host = host.trim();
    output
        .lines()
        .filter(|line| {
            line.trim().is_empty()
                || (!host.is_empty() && line.contains(host))
                || line.starts_with("PLAY ")
                || line.starts_with("TASK ")
                || line.contains("PLAY RECAP")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn host_sections(output: &str, hosts: &[String]) -> Vec<HostOutput> {
    if output.is_empty() {
        return Vec::new();
    }
    hosts
        .iter()
        .map(|host| HostOutput {
            host: host.clone(),
            output: filter_host_output(output, host),
        })
        .collect()
}
