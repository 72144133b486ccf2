use std::collections::HashMap;

use super::schema::{CartRow, LineItem};

/// Groups rows by ingredient name and sums their amounts. The unit of the
/// first row seen for a name is kept and items appear in first-encounter
/// order.
pub fn build_shopping_list<I>(rows: I) -> Vec<LineItem>
where
    I: IntoIterator<Item = CartRow>,
{
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut items: Vec<LineItem> = vec![];

    for row in rows {
        match positions.get(&row.ingredient_name).copied() {
            Some(i) => items[i].total_amount += i64::from(row.amount),
            None => {
                positions.insert(row.ingredient_name.to_owned(), items.len());
                items.push(LineItem {
                    ingredient_name: row.ingredient_name,
                    measurement_unit: row.measurement_unit,
                    total_amount: i64::from(row.amount),
                });
            }
        }
    }

    items
}

/*
1. Salt (g) - 12
2. Milk (ml) - 500
*/
pub fn render_shopping_list(items: &[LineItem]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            format!(
                "{}. {} ({}) - {}\n",
                i + 1,
                item.ingredient_name,
                item.measurement_unit,
                item.total_amount
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, unit: &str, amount: i32) -> CartRow {
        CartRow {
            ingredient_name: name.to_string(),
            measurement_unit: unit.to_string(),
            amount,
        }
    }

    #[test]
    fn same_name_is_summed() {
        let items = build_shopping_list(vec![row("Salt", "g", 5), row("Salt", "g", 7)]);

        assert_eq!(
            items,
            vec![LineItem {
                ingredient_name: String::from("Salt"),
                measurement_unit: String::from("g"),
                total_amount: 12,
            }]
        );
    }

    #[test]
    fn empty_cart_gives_empty_list() {
        assert!(build_shopping_list(Vec::<CartRow>::new()).is_empty());
        assert_eq!(render_shopping_list(&[]), "");
    }

    #[test]
    fn first_encounter_order_and_unit_are_kept() {
        let items = build_shopping_list(vec![
            row("Milk", "ml", 200),
            row("Salt", "g", 5),
            row("Milk", "l", 300),
            row("Eggs", "pcs", 2),
        ]);

        let names: Vec<&str> = items.iter().map(|i| i.ingredient_name.as_str()).collect();
        assert_eq!(names, vec!["Milk", "Salt", "Eggs"]);
        assert_eq!(items[0].measurement_unit, "ml");
        assert_eq!(items[0].total_amount, 500);
    }

    #[test]
    fn totals_do_not_overflow_row_amounts() {
        let items = build_shopping_list(vec![row("Flour", "g", i32::MAX), row("Flour", "g", 1)]);

        assert_eq!(items[0].total_amount, i64::from(i32::MAX) + 1);
    }

    #[test]
    fn rendering_numbers_each_line() {
        let items = build_shopping_list(vec![row("Salt", "g", 12), row("Milk", "ml", 500)]);

        assert_eq!(
            render_shopping_list(&items),
            "1. Salt (g) - 12\n2. Milk (ml) - 500\n"
        );
    }
}
