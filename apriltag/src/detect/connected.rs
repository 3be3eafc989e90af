use super::image::ImageU8;
use super::unionfind::UnionFind;

/// Build connected components on a thresholded image using union-find.
///
/// Two adjacent pixels are connected if they have the same threshold value
/// (both 0 or both 255). Pixels with value 127 (unknown) are never connected.
///
/// Uses asymmetric connectivity: diagonals are only checked for white pixels.
pub fn connected_components(threshed: &ImageU8) -> UnionFind {
    let w = threshed.width;
    let h = threshed.height;
    let mut uf = UnionFind::new((w * h) as usize);

    for y in 0..h {
        for x in 0..w {
            let v = threshed.get(x, y);
            if v == 127 {
                continue;
            }

            let id = y * w + x;

            // Left neighbor (always check)
            if x > 0 && threshed.get(x - 1, y) == v {
                uf.union(id, id - 1);
            }

            // Up neighbor: skip if left, upper-left, and up all equal v
            if y > 0 {
                let up = threshed.get(x, y - 1);
                let left = if x > 0 { threshed.get(x - 1, y) } else { 127 };
                let upper_left = if x > 0 {
                    threshed.get(x - 1, y - 1)
                } else {
                    127
                };
                if up == v && !(left == v && upper_left == v) {
                    uf.union(id, id - w);
                }
            }

            // Upper-left diagonal: only for white pixels
            if v == 255 && x > 0 && y > 0 {
                let ul = threshed.get(x - 1, y - 1);
                let left = threshed.get(x - 1, y);
                let up = threshed.get(x, y - 1);
                if ul == v && left != v && up != v {
                    uf.union(id, id - w - 1);
                }
            }

            // Upper-right diagonal: only for white pixels
            if v == 255 && x + 1 < w && y > 0 {
                let ur = threshed.get(x + 1, y - 1);
                let up = threshed.get(x, y - 1);
                if ur == v && up != v {
                    uf.union(id, (y - 1) * w + (x + 1));
                }
            }
        }
    }

    uf
}
