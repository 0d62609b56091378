//! Well labels and plate traversal orders

/// Row letters for a 0-based row: A..Z, then AA, AB, ...
fn row_letters(row: usize) -> String {
    let mut n = row + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Label a well from 0-based row and column, e.g. (1, 2) -> "B3"
pub fn well_label(row: usize, column: usize) -> String {
    format!("{}{}", row_letters(row), column + 1)
}

/// Parse a label such as "B3" or "AF48" into 0-based (row, column)
pub fn parse_well_label(label: &str) -> Option<(usize, usize)> {
    let label = label.trim();
    let split = label.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = label.split_at(split);
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }

    let mut row = 0usize;
    for c in letters.chars() {
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        row = row.checked_mul(26)?.checked_add(digit)?;
    }
    let column: usize = digits.parse().ok()?;
    if column == 0 {
        return None;
    }
    Some((row - 1, column - 1))
}

/// Every position of a plate, down each column then across
pub fn column_major(rows: usize, columns: usize) -> Vec<(usize, usize)> {
    (0..columns)
        .flat_map(|column| (0..rows).map(move |row| (row, column)))
        .collect()
}

/// Column-major over 2x2 blocks, visiting one well of each quadrant in turn.
///
/// Consecutive wells land in different quadrants of the plate, so a
/// quadrant-format dispenser spreads neighbouring sources. Plates with an
/// odd dimension fall back to plain column-major order.
pub fn quadrant_order(rows: usize, columns: usize) -> Vec<(usize, usize)> {
    if rows % 2 != 0 || columns % 2 != 0 {
        return column_major(rows, columns);
    }
    let mut order = Vec::with_capacity(rows * columns);
    for block_column in 0..columns / 2 {
        for block_row in 0..rows / 2 {
            for quadrant in 0..4 {
                order.push((2 * block_row + quadrant / 2, 2 * block_column + quadrant % 2));
            }
        }
    }
    order
}
