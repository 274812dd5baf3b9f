use crate::NodeId;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Page graph read from a links file (`nodeID;out1,out2,...`) and a titles
/// file (`nodeID;title`). Node ids are unrelated to document ids; titles are
/// the bridge between the two.
#[derive(Debug, Clone, Default)]
pub struct LinkGraph {
    title_to_id: HashMap<String, NodeId>,
    id_to_title: HashMap<NodeId, String>,
    out_links: HashMap<NodeId, Vec<NodeId>>,
    in_links: HashMap<NodeId, Vec<NodeId>>,
}

impl LinkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads both files. Missing files and malformed lines are logged and
    /// skipped, so the result may be partial or empty.
    pub fn load(links: &Path, titles: &Path) -> Self {
        let mut graph = LinkGraph::new();
        match read_lines(titles) {
            Ok(lines) => {
                for (n, line) in lines {
                    match parse_title(&line) {
                        Some((id, title)) => graph.add_title(id, title),
                        None => tracing::warn!(file = %titles.display(), line = n, "malformed title line"),
                    }
                }
            }
            Err(e) => tracing::warn!(file = %titles.display(), error = %e, "cannot read titles file"),
        }
        match read_lines(links) {
            Ok(lines) => {
                for (n, line) in lines {
                    match parse_links(&line) {
                        Some((from, targets)) => {
                            for to in targets {
                                graph.add_link(from, to);
                            }
                        }
                        None => tracing::warn!(file = %links.display(), line = n, "malformed links line"),
                    }
                }
            }
            Err(e) => tracing::warn!(file = %links.display(), error = %e, "cannot read links file"),
        }
        tracing::info!(titles = graph.title_to_id.len(), linked_nodes = graph.out_links.len(), "link graph loaded");
        graph
    }

    pub fn add_title(&mut self, id: NodeId, title: impl Into<String>) {
        let title = title.into();
        self.title_to_id.insert(title.clone(), id);
        self.id_to_title.insert(id, title);
    }

    /// Adds `from -> to`; repeated links are ignored.
    pub fn add_link(&mut self, from: NodeId, to: NodeId) {
        let outs = self.out_links.entry(from).or_default();
        if outs.contains(&to) {
            return;
        }
        outs.push(to);
        self.in_links.entry(to).or_default().push(from);
    }

    pub fn id_by_title(&self, title: &str) -> Option<NodeId> {
        self.title_to_id.get(title).copied()
    }

    pub fn title(&self, id: NodeId) -> Option<&str> {
        self.id_to_title.get(&id).map(String::as_str)
    }

    pub fn out_links(&self, id: NodeId) -> &[NodeId] {
        self.out_links.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn in_links(&self, id: NodeId) -> &[NodeId] {
        self.in_links.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every node that has a title or takes part in a link, sorted.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut all: HashSet<NodeId> = self.id_to_title.keys().copied().collect();
        all.extend(self.out_links.keys().copied());
        all.extend(self.in_links.keys().copied());
        let mut nodes: Vec<NodeId> = all.into_iter().collect();
        nodes.sort_unstable();
        nodes
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_title.is_empty() && self.out_links.is_empty()
    }
}

fn read_lines(path: &Path) -> std::io::Result<Vec<(usize, String)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if !line.trim().is_empty() {
            out.push((n + 1, line));
        }
    }
    Ok(out)
}

fn parse_title(line: &str) -> Option<(NodeId, &str)> {
    let (id, title) = line.split_once(';')?;
    let id = id.trim().parse().ok()?;
    let title = title.trim();
    (!title.is_empty()).then_some((id, title))
}

fn parse_links(line: &str) -> Option<(NodeId, Vec<NodeId>)> {
    let (from, rest) = line.split_once(';')?;
    let from = from.trim().parse().ok()?;
    let targets = rest
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect::<Option<Vec<NodeId>>>()?;
    Some((from, targets))
}
