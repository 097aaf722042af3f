//! 诊断快照
//!
//! 出错、超时或收到告警时，把图结构写成 DOT（可用 graphviz 渲染）和 JSON 两份
//! 侧文件。尽力而为：写入失败只打 warn 日志，不影响迭代结果。

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use contracts::{ElementKind, GraphSnapshot, LinkState};
use tracing::{debug, warn};

/// 快照转储器
#[derive(Debug, Clone)]
pub struct SnapshotDumper {
    dir: PathBuf,
}

impl SnapshotDumper {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 写出 `<dir>/<timestamp>-<kind>-<pipeline>.{dot,json}`
    ///
    /// 返回 DOT 文件路径；任何 IO 失败都返回 `None`。
    pub fn dump(&self, snapshot: &GraphSnapshot, kind: &str) -> Option<PathBuf> {
        match self.try_dump(snapshot, kind) {
            Ok(path) => {
                debug!(path = %path.display(), kind, "graph snapshot written");
                Some(path)
            }
            Err(e) => {
                warn!(dir = %self.dir.display(), kind, error = %e, "failed to write graph snapshot");
                None
            }
        }
    }

    fn try_dump(&self, snapshot: &GraphSnapshot, kind: &str) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f");
        let stem = format!("{timestamp}-{kind}-{}", snapshot.name);
        let dot_path = self.dir.join(format!("{stem}.dot"));
        let json_path = self.dir.join(format!("{stem}.json"));

        fs::write(&dot_path, to_dot(snapshot))?;
        let json = serde_json::to_vec_pretty(snapshot).map_err(std::io::Error::other)?;
        fs::write(json_path, json)?;
        Ok(dot_path)
    }
}

/// 渲染为 graphviz DOT
pub fn to_dot(snapshot: &GraphSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", escape(&snapshot.name));
    let _ = writeln!(out, "  rankdir=LR;");
    let _ = writeln!(out, "  label=\"{} ({})\";", escape(&snapshot.name), snapshot.state);
    let _ = writeln!(out, "  node [shape=box, fontsize=10];");

    for element in &snapshot.elements {
        let shape = match element.kind {
            ElementKind::FanOut => "trapezium",
            ElementKind::Sink => "box3d",
            _ => "box",
        };
        let _ = writeln!(
            out,
            "  \"{}\" [shape={shape}, label=\"{}\\n{:?} {}\\nunits={}\"];",
            escape(&element.name),
            escape(&element.name),
            element.kind,
            element.state,
            element.units
        );

        // 尚未连接的端口单独画出来，最容易看出卡在哪里
        for port in element.ports.iter().filter(|p| p.state != LinkState::Linked) {
            let port_node = format!("{}:{}", element.name, port.id);
            let _ = writeln!(
                out,
                "  \"{}\" [shape=point, xlabel=\"{} {:?} probes={}\"];",
                escape(&port_node),
                port.id,
                port.state,
                port.pending_probes
            );
            let _ = writeln!(
                out,
                "  \"{}\" -> \"{}\" [style=dashed];",
                escape(&element.name),
                escape(&port_node)
            );
        }
    }

    for link in &snapshot.links {
        let _ = writeln!(out, "  \"{}\" -> \"{}\";", escape(&link.from), escape(&link.to));
    }

    out.push_str("}\n");
    out
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ElementId, ElementSnapshot, ElementState, LinkSnapshot, PortId, PortSnapshot};

    fn snapshot() -> GraphSnapshot {
        let port = |id, state| PortSnapshot {
            id: PortId(id),
            state,
            peer: None,
            link_calls: 0,
            linked_at: None,
            first_delivery_at: None,
            deliveries: 0,
            pending_probes: 1,
        };
        GraphSnapshot {
            name: "tee_test_3".into(),
            state: ElementState::Playing,
            elements: vec![
                ElementSnapshot {
                    id: ElementId(0),
                    name: "tee0".into(),
                    kind: ElementKind::FanOut,
                    state: ElementState::Playing,
                    units: 42,
                    ports: vec![port(0, LinkState::Linked), port(1, LinkState::Unlinked)],
                },
                ElementSnapshot {
                    id: ElementId(1),
                    name: "queue0".into(),
                    kind: ElementKind::Queue,
                    state: ElementState::Playing,
                    units: 40,
                    ports: Vec::new(),
                },
            ],
            links: vec![LinkSnapshot {
                from: "tee0".into(),
                to: "queue0".into(),
            }],
        }
    }

    #[test]
    fn test_dot_contains_links_and_pending_ports() {
        let dot = to_dot(&snapshot());
        assert!(dot.starts_with("digraph \"tee_test_3\""));
        assert!(dot.contains("\"tee0\" -> \"queue0\";"));
        assert!(dot.contains("\"tee0:src_1\" [shape=point"));
        assert!(!dot.contains("\"tee0:src_0\""));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_dump_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let dumper = SnapshotDumper::new(dir.path().join("dumps"));

        let dot_path = dumper.dump(&snapshot(), "timeout").unwrap();
        let file_name = dot_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(file_name.ends_with("-timeout-tee_test_3.dot"));

        let json_path = dot_path.with_extension("json");
        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(json_path).unwrap()).unwrap();
        assert_eq!(json["name"], "tee_test_3");
        assert_eq!(json["elements"][0]["ports"][1]["state"], "unlinked");
    }

    #[test]
    fn test_dump_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();

        // A regular file where the directory should be
        let dumper = SnapshotDumper::new(&blocker);
        assert!(dumper.dump(&snapshot(), "error").is_none());
    }
}
