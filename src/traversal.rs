//! Cycle detection over id-keyed graphs.
//!
//! Iterative DFS with an explicit frame stack and a visited / in-stack
//! pair, so deep or adversarial documents cannot blow the call stack.

use std::collections::HashSet;

struct Frame<'a> {
    id: &'a str,
    successors: Vec<&'a str>,
    next: usize,
}

/// Returns one path per detected cycle, e.g. `[a, b, a]`.
///
/// Each cycle is reported once, at the edge that re-enters a node still
/// on the stack. Finding a cycle halts the descent from that start; later
/// starts that were not reached are still scanned. `successors` should
/// only yield ids that exist.
pub fn find_cycles<'a, S, F, I>(starts: S, mut successors: F) -> Vec<Vec<&'a str>>
where
    S: IntoIterator<Item = &'a str>,
    F: FnMut(&'a str) -> I,
    I: IntoIterator<Item = &'a str>,
{
    let mut visited: HashSet<&'a str> = HashSet::new();
    let mut in_stack: HashSet<&'a str> = HashSet::new();
    let mut cycles = Vec::new();

    for start in starts {
        if !visited.insert(start) {
            continue;
        }
        in_stack.insert(start);
        let mut stack = vec![Frame {
            id: start,
            successors: successors(start).into_iter().collect(),
            next: 0,
        }];

        while let Some(frame) = stack.last_mut() {
            if frame.next >= frame.successors.len() {
                in_stack.remove(frame.id);
                stack.pop();
                continue;
            }
            let target = frame.successors[frame.next];
            frame.next += 1;

            if in_stack.contains(target) {
                let from = stack.iter().position(|f| f.id == target).unwrap_or(0);
                let mut path: Vec<&'a str> = stack[from..].iter().map(|f| f.id).collect();
                path.push(target);
                cycles.push(path);
                break;
            }
            if visited.insert(target) {
                in_stack.insert(target);
                stack.push(Frame {
                    id: target,
                    successors: successors(target).into_iter().collect(),
                    next: 0,
                });
            }
        }

        for frame in stack.drain(..) {
            in_stack.remove(frame.id);
        }
    }

    cycles
}
