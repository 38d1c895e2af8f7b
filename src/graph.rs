use crate::element::Discipline;
use crate::error::TopologyError;

/// One endpoint of a connection: (element index, port index).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PortId {
    pub element: usize,
    pub port: usize,
}

/// A directed hookup from an output port to an input port.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Connection {
    pub from: PortId,
    pub to: PortId,
}

impl Connection {
    /// Canonical rendering, e.g. `src[0]->[0]sink`.
    pub fn unparse(&self, names: &[String]) -> String {
        format!(
            "{}[{}]->[{}]{}",
            names[self.from.element], self.from.port, self.to.port, names[self.to.element]
        )
    }
}

/// Declared port disciplines of one element, as of post-`configure`.
#[derive(Clone, Debug)]
pub struct DeclaredPorts {
    pub inputs: Vec<Discipline>,
    pub outputs: Vec<Discipline>,
}

/// The outcome of discipline resolution: every port and every connection has
/// a concrete discipline, plus the dispatch tables derived from the topology.
#[derive(Debug)]
pub struct Resolved {
    /// Effective discipline per connection, same order as the input list.
    pub conn_disc: Vec<Discipline>,
    /// Effective discipline per element input port.
    pub input_disc: Vec<Vec<Discipline>>,
    /// Effective discipline per element output port.
    pub output_disc: Vec<Vec<Discipline>>,
    /// `[element][output port]` → peers receiving pushes, in connection order.
    pub push_targets: Vec<Vec<Vec<PortId>>>,
    /// `[element][input port]` → peers answering pulls, in connection order.
    pub pull_sources: Vec<Vec<Vec<PortId>>>,
}

// Merge table of §"port discipline resolution": one concrete endpoint decides;
// two concrete endpoints must agree; two agnostic endpoints decide nothing.
fn merge(
    out: Discipline,
    inp: Discipline,
    conn_name: impl Fn() -> String,
) -> Result<Discipline, TopologyError> {
    match (out, inp) {
        (Discipline::Push, Discipline::Push)
        | (Discipline::Push, Discipline::Agnostic)
        | (Discipline::Agnostic, Discipline::Push) => Ok(Discipline::Push),
        (Discipline::Pull, Discipline::Pull)
        | (Discipline::Pull, Discipline::Agnostic)
        | (Discipline::Agnostic, Discipline::Pull) => Ok(Discipline::Pull),
        (Discipline::Push, Discipline::Pull) | (Discipline::Pull, Discipline::Push) => {
            Err(TopologyError::DisciplineMismatch { conn: conn_name() })
        }
        (Discipline::Agnostic, Discipline::Agnostic) => {
            Err(TopologyError::Ambiguous { conn: conn_name() })
        }
    }
}

/// Resolve every port to a concrete discipline and build dispatch tables.
///
/// Runs once, after the graph is frozen and before `initialize`. Fails on the
/// first invalid or ambiguous connection, a port demanded in two disciplines,
/// pull fan-out over non-pull-marked inputs, or a dangling port.
pub fn resolve(
    names: &[String],
    ports: &[DeclaredPorts],
    connections: &[Connection],
) -> Result<Resolved, TopologyError> {
    let n = names.len();
    debug_assert_eq!(ports.len(), n);

    // Port bounds.
    for c in connections {
        let conn = || c.unparse(names);
        if c.from.element >= n || c.from.port >= ports[c.from.element].outputs.len() {
            return Err(TopologyError::BadPort {
                conn: conn(),
                element: names[c.from.element.min(n - 1)].clone(),
            });
        }
        if c.to.element >= n || c.to.port >= ports[c.to.element].inputs.len() {
            return Err(TopologyError::BadPort {
                conn: conn(),
                element: names[c.to.element.min(n - 1)].clone(),
            });
        }
    }

    // Per-connection merge.
    let mut conn_disc = Vec::with_capacity(connections.len());
    for c in connections {
        let out = ports[c.from.element].outputs[c.from.port];
        let inp = ports[c.to.element].inputs[c.to.port];
        conn_disc.push(merge(out, inp, || c.unparse(names))?);
    }

    // Effective per-port disciplines; agnostic ports adopt their peers', and
    // may not be torn between two answers.
    let mut input_disc: Vec<Vec<Option<Discipline>>> = ports
        .iter()
        .map(|p| vec![None; p.inputs.len()])
        .collect();
    let mut output_disc: Vec<Vec<Option<Discipline>>> = ports
        .iter()
        .map(|p| vec![None; p.outputs.len()])
        .collect();

    for (c, &d) in connections.iter().zip(&conn_disc) {
        for (slot, element, port, kind) in [
            (
                &mut output_disc[c.from.element][c.from.port],
                c.from.element,
                c.from.port,
                "output",
            ),
            (
                &mut input_disc[c.to.element][c.to.port],
                c.to.element,
                c.to.port,
                "input",
            ),
        ] {
            match slot {
                None => *slot = Some(d),
                Some(prev) if *prev == d => {}
                Some(_) => {
                    return Err(TopologyError::MixedPeers {
                        element: names[element].clone(),
                        port: format!("{kind} {port}"),
                    });
                }
            }
        }
    }

    // Pull fan-out must land only on inputs declared pull.
    for (ei, p) in ports.iter().enumerate() {
        for (pi, &decl) in p.outputs.iter().enumerate() {
            if decl != Discipline::Pull {
                continue;
            }
            let fanout: Vec<&Connection> = connections
                .iter()
                .filter(|c| c.from.element == ei && c.from.port == pi)
                .collect();
            if fanout.len() > 1 {
                for c in fanout {
                    if ports[c.to.element].inputs[c.to.port] != Discipline::Pull {
                        return Err(TopologyError::PullFanout {
                            conn: c.unparse(names),
                        });
                    }
                }
            }
        }
    }

    // Dangling ports.
    for (ei, p) in ports.iter().enumerate() {
        for pi in 0..p.inputs.len() {
            if input_disc[ei][pi].is_none() {
                return Err(TopologyError::Dangling {
                    element: names[ei].clone(),
                    port: format!("input {pi}"),
                });
            }
        }
        for pi in 0..p.outputs.len() {
            if output_disc[ei][pi].is_none() {
                return Err(TopologyError::Dangling {
                    element: names[ei].clone(),
                    port: format!("output {pi}"),
                });
            }
        }
    }

    // Dispatch tables.
    let mut push_targets: Vec<Vec<Vec<PortId>>> = ports
        .iter()
        .map(|p| vec![Vec::new(); p.outputs.len()])
        .collect();
    let mut pull_sources: Vec<Vec<Vec<PortId>>> = ports
        .iter()
        .map(|p| vec![Vec::new(); p.inputs.len()])
        .collect();
    for (c, &d) in connections.iter().zip(&conn_disc) {
        match d {
            Discipline::Push => push_targets[c.from.element][c.from.port].push(c.to),
            Discipline::Pull => pull_sources[c.to.element][c.to.port].push(c.from),
            Discipline::Agnostic => unreachable!("agnostic connection after resolution"),
        }
    }

    Ok(Resolved {
        conn_disc,
        input_disc: input_disc
            .into_iter()
            .map(|v| v.into_iter().map(Option::unwrap).collect())
            .collect(),
        output_disc: output_disc
            .into_iter()
            .map(|v| v.into_iter().map(Option::unwrap).collect())
            .collect(),
        push_targets,
        pull_sources,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn conn(fe: usize, fp: usize, te: usize, tp: usize) -> Connection {
        Connection {
            from: PortId { element: fe, port: fp },
            to: PortId { element: te, port: tp },
        }
    }

    #[test]
    fn agnostic_adopts_concrete_peer() {
        let r = resolve(
            &names(&["src", "mid", "sink"]),
            &[
                DeclaredPorts { inputs: vec![], outputs: vec![Discipline::Push] },
                DeclaredPorts {
                    inputs: vec![Discipline::Agnostic],
                    outputs: vec![Discipline::Agnostic],
                },
                DeclaredPorts { inputs: vec![Discipline::Push], outputs: vec![] },
            ],
            &[conn(0, 0, 1, 0), conn(1, 0, 2, 0)],
        )
        .unwrap();
        assert_eq!(r.conn_disc, vec![Discipline::Push, Discipline::Push]);
        assert_eq!(r.input_disc[1], vec![Discipline::Push]);
        assert_eq!(r.output_disc[1], vec![Discipline::Push]);
    }

    #[test]
    fn push_to_pull_is_invalid_and_names_the_connection() {
        let err = resolve(
            &names(&["a", "b"]),
            &[
                DeclaredPorts { inputs: vec![], outputs: vec![Discipline::Push] },
                DeclaredPorts { inputs: vec![Discipline::Pull], outputs: vec![] },
            ],
            &[conn(0, 0, 1, 0)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            TopologyError::DisciplineMismatch { conn: "a[0]->[0]b".into() }
        );
    }

    #[test]
    fn double_agnostic_is_ambiguous() {
        let err = resolve(
            &names(&["a", "b"]),
            &[
                DeclaredPorts { inputs: vec![], outputs: vec![Discipline::Agnostic] },
                DeclaredPorts { inputs: vec![Discipline::Agnostic], outputs: vec![] },
            ],
            &[conn(0, 0, 1, 0)],
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::Ambiguous { .. }));
    }

    #[test]
    fn agnostic_output_with_mixed_peers_fails() {
        let err = resolve(
            &names(&["a", "p", "q"]),
            &[
                DeclaredPorts { inputs: vec![], outputs: vec![Discipline::Agnostic] },
                DeclaredPorts { inputs: vec![Discipline::Push], outputs: vec![] },
                DeclaredPorts { inputs: vec![Discipline::Pull], outputs: vec![] },
            ],
            &[conn(0, 0, 1, 0), conn(0, 0, 2, 0)],
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::MixedPeers { .. }));
    }

    #[test]
    fn dangling_port_is_an_error() {
        let err = resolve(
            &names(&["a", "b"]),
            &[
                DeclaredPorts {
                    inputs: vec![],
                    outputs: vec![Discipline::Push, Discipline::Push],
                },
                DeclaredPorts { inputs: vec![Discipline::Push], outputs: vec![] },
            ],
            &[conn(0, 0, 1, 0)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            TopologyError::Dangling { element: "a".into(), port: "output 1".into() }
        );
    }

    #[test]
    fn push_fan_in_is_valid() {
        let r = resolve(
            &names(&["a", "b", "sink"]),
            &[
                DeclaredPorts { inputs: vec![], outputs: vec![Discipline::Push] },
                DeclaredPorts { inputs: vec![], outputs: vec![Discipline::Push] },
                DeclaredPorts { inputs: vec![Discipline::Push], outputs: vec![] },
            ],
            &[conn(0, 0, 2, 0), conn(1, 0, 2, 0)],
        )
        .unwrap();
        assert_eq!(r.pull_sources[2][0].len(), 0);
        assert_eq!(r.push_targets[0][0], vec![PortId { element: 2, port: 0 }]);
        assert_eq!(r.push_targets[1][0], vec![PortId { element: 2, port: 0 }]);
    }

    #[test]
    fn pull_fanout_requires_pull_marked_inputs() {
        let err = resolve(
            &names(&["q", "a", "b"]),
            &[
                DeclaredPorts { inputs: vec![], outputs: vec![Discipline::Pull] },
                DeclaredPorts { inputs: vec![Discipline::Pull], outputs: vec![] },
                DeclaredPorts { inputs: vec![Discipline::Agnostic], outputs: vec![] },
            ],
            &[conn(0, 0, 1, 0), conn(0, 0, 2, 0)],
        )
        .unwrap_err();
        assert!(matches!(err, TopologyError::PullFanout { .. }));
    }
}
