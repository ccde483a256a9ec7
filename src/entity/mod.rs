pub mod addresses;
pub mod audit_logs;
pub mod cart_items;
pub mod contact_messages;
pub mod order_items;
pub mod orders;
pub mod products;
pub mod settings;
pub mod users;

pub use addresses::Entity as Addresses;
pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use contact_messages::Entity as ContactMessages;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use products::Entity as Products;
pub use settings::Entity as Settings;
pub use users::Entity as Users;
