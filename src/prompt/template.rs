//! Prompt template for SQL generation
//!
//! The few-shot template pins a small demonstration schema and two worked
//! examples in front of the user request. Base code models continue the
//! final `# Output:` line with a statement in the same shape.

/// Marker the model is expected to continue after. Extraction keys off the
/// last occurrence of this string in the generated text.
pub const OUTPUT_MARKER: &str = "# Output:";

/// Placeholder substituted with the user request.
pub const REQUEST_SLOT: &str = "{request}";

/// Default few-shot template: schema comment block, two example pairs, and
/// a trailing output marker with no newline after it.
pub const SQL_FEW_SHOT_TEMPLATE: &str = concat!(
    "### SQL Generation\n",
    "# Schema:\n",
    "#   users(user_id INT, first_name VARCHAR, last_name VARCHAR, email VARCHAR, signup_date DATE)\n",
    "#   orders(order_id INT, user_id INT, order_total FLOAT, order_date DATE)\n",
    "#   products(product_id INT, name VARCHAR, price FLOAT)\n",
    "\n",
    "# Examples:\n",
    "# Input: Find total number of orders placed by each user.\n",
    "# Output: SELECT u.first_name, u.last_name, COUNT(o.order_id) AS total_orders ",
    "FROM users u JOIN orders o ON u.user_id = o.user_id GROUP BY u.user_id;\n",
    "\n",
    "# Input: Create a table of employees with columns emp_id, emp_name, emp_address.\n",
    "# Output: CREATE TABLE employees (emp_id INT, emp_name VARCHAR(255), emp_address VARCHAR(255));\n",
    "\n",
    "# Now your request:\n",
    "# Input: {request}\n",
    "# Output:"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_ends_with_marker() {
        assert!(SQL_FEW_SHOT_TEMPLATE.ends_with(OUTPUT_MARKER));
        assert!(!SQL_FEW_SHOT_TEMPLATE.ends_with('\n'));
    }

    #[test]
    fn test_template_has_request_slot() {
        assert_eq!(SQL_FEW_SHOT_TEMPLATE.matches(REQUEST_SLOT).count(), 1);
    }

    #[test]
    fn test_template_schema_tables() {
        assert!(SQL_FEW_SHOT_TEMPLATE.contains("users(user_id INT"));
        assert!(SQL_FEW_SHOT_TEMPLATE.contains("orders(order_id INT"));
        assert!(SQL_FEW_SHOT_TEMPLATE.contains("products(product_id INT"));
    }

    #[test]
    fn test_template_example_markers() {
        // Two worked examples plus the trailing continuation marker
        assert_eq!(SQL_FEW_SHOT_TEMPLATE.matches(OUTPUT_MARKER).count(), 3);
    }
}
