/// Generate the data string for a classic layout of the given grid size.
///
/// Classic layout uses L-infinity distance from the grid boundary:
/// - dist == 0: white border (`w`)
/// - dist == 1: black border (`b`)
/// - dist >= 2: data (`d`)
pub fn classic_data_string(size: usize) -> String {
    let mut s = String::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let dist = l_inf_dist_to_edge(x, y, size);
            s.push(match dist {
                0 => 'w',
                1 => 'b',
                _ => 'd',
            });
        }
    }
    s
}

fn l_inf_dist_to_edge(x: usize, y: usize, size: usize) -> usize {
    x.min(size - 1 - x).min(y.min(size - 1 - y))
}
