//! Plain-text rendering of client models on stdout.

#![allow(clippy::print_stdout)]

use storefront_core::{CartItem, CheckoutReceipt, Order, Price, Product, User};

pub fn message(text: &str) {
    println!("{text}");
}

pub fn user(user: &User) {
    println!("{} <{}>", user.username, user.email);
    println!("  id:   {}", user.id);
    println!("  role: {}", user.role);
}

pub fn products(products: &[Product], total: Option<u64>) {
    if products.is_empty() {
        println!("No products found.");
        return;
    }
    println!("{:>6}  {:<32} {:>10} {:>6}  CATEGORY", "ID", "NAME", "PRICE", "STOCK");
    for product in products {
        println!(
            "{:>6}  {:<32} {:>10} {:>6}  {}",
            product.id,
            truncate(&product.name, 32),
            format!("${}", product.price),
            product.stock,
            product.category
        );
    }
    if let Some(total) = total {
        println!("{} of {total} products", products.len());
    }
}

pub fn product(product: &Product) {
    println!("{} (#{})", product.name, product.id);
    println!("  price:    ${}", product.price);
    println!(
        "  stock:    {}{}",
        product.stock,
        if product.in_stock() { "" } else { " (out of stock)" }
    );
    println!("  category: {}", product.category);
    if let Some(vendor) = product.vendor_id {
        println!("  vendor:   {vendor}");
    }
    if !product.description.is_empty() {
        println!();
        println!("{}", product.description);
    }
}

pub fn cart(items: &[CartItem], count: u64, total: Price) {
    if items.is_empty() {
        println!("Your cart is empty.");
        return;
    }
    println!("{:>6}  {:<32} {:>4} {:>10}", "LINE", "PRODUCT", "QTY", "SUBTOTAL");
    for item in items {
        println!(
            "{:>6}  {:<32} {:>4} {:>10}",
            item.id,
            truncate(&item.product.name, 32),
            item.quantity,
            format!("${}", item.line_total())
        );
    }
    println!("{count} item(s), total ${total}");
}

pub fn receipt(receipt: &CheckoutReceipt) {
    println!("Order #{} placed ({})", receipt.order_id, receipt.status);
    if let Some(total) = receipt.total_amount {
        println!("  total:   ${total}");
    }
    if let Some(intent) = &receipt.payment_intent_id {
        println!("  payment: {intent}");
    }
}

pub fn orders(orders: &[Order]) {
    if orders.is_empty() {
        println!("No orders yet.");
        return;
    }
    println!("{:>6}  {:<10} {:>10} {:>5}  PLACED", "ORDER", "STATUS", "TOTAL", "ITEMS");
    for order in orders {
        println!(
            "{:>6}  {:<10} {:>10} {:>5}  {}",
            order.id,
            order.status,
            format!("${}", order.total_amount),
            order.item_count(),
            order.created_at.format("%Y-%m-%d %H:%M")
        );
    }
}

pub fn order(order: &Order) {
    println!("Order #{} ({})", order.id, order.status);
    println!("  placed: {}", order.created_at.format("%Y-%m-%d %H:%M UTC"));
    for item in &order.items {
        println!(
            "  {:>3} x {:<32} ${}",
            item.quantity,
            truncate(&item.product_name, 32),
            item.price
        );
    }
    println!("  total:  ${}", order.total_amount);
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_owned()
    } else {
        let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
        cut.push('…');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Mug", 5), "Mug");
        assert_eq!(truncate("Ceramic mug", 5), "Cera…");
    }
}
