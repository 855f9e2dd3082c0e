use jobmon_core::filter_host_output;
use pretty_assertions::assert_eq;

const TRANSCRIPT: &str = "\
PLAY [baseline] *****************************************************

TASK [Gathering Facts] **********************************************
ok: [web1]
ok: [db1]

TASK [Set hostname] *************************************************
changed: [web1]
fatal: [db1]: UNREACHABLE! => {\"changed\": false}

PLAY RECAP **********************************************************
web1 : ok=2 changed=1 unreachable=0 failed=0
db1  : ok=1 changed=0 unreachable=1 failed=0";

#[test]
fn keeps_headers_recap_and_matching_lines() {
    let web = filter_host_output(TRANSCRIPT, "web1");
    assert_eq!(
        web,
        "\
PLAY [baseline] *****************************************************

TASK [Gathering Facts] **********************************************
ok: [web1]

TASK [Set hostname] *************************************************
changed: [web1]

PLAY RECAP **********************************************************
web1 : ok=2 changed=1 unreachable=0 failed=0"
    );
}

#[test]
fn other_hosts_lines_are_dropped() {
    let db = filter_host_output(TRANSCRIPT, "db1");
    assert!(db.contains("fatal: [db1]"));
    assert!(!db.contains("web1"));
}

#[test]
fn blank_host_keeps_only_shared_lines() {
    let shared = filter_host_output("PLAY [x]\nok: [a]\nTASK [y]", "  ");
    assert_eq!(shared, "PLAY [x]\nTASK [y]");
}
