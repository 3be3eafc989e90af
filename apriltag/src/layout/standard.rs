/// Generate the data string for a standard layout of the given grid size.
///
/// Standard layout uses L-infinity distance from the grid boundary:
/// - dist == 1: black border (`b`)
/// - dist == 2: white border (`w`)
/// - dist == 0 or dist >= 3: data (`d`)
pub fn standard_data_string(size: usize) -> String {
    let mut s = String::with_capacity(size * size);
    for y in 0..size {
        for x in 0..size {
            let dist = l_inf_dist_to_edge(x, y, size);
            s.push(match dist {
                1 => 'b',
                2 => 'w',
                _ => 'd',
            });
        }
    }
    s
}

fn l_inf_dist_to_edge(x: usize, y: usize, size: usize) -> usize {
    x.min(size - 1 - x).min(y.min(size - 1 - y))
}
