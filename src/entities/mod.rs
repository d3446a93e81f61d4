pub mod cart;
pub mod image;
pub mod order;
pub mod order_item;
pub mod product;
pub mod profile;
pub mod session;
pub mod user;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Schema, Set, TransactionTrait};
use std::sync::Arc;

use crate::entities::{
    cart::Entity as Cart, image::Entity as Image, order::Entity as Order,
    order_item::Entity as OrderItem, product::Entity as Product, profile::Entity as Profile,
    session::Entity as Session, user::Entity as User,
};

pub async fn setup_schema(db: &DatabaseConnection) {
    let schema = Schema::new(db.get_database_backend());
    let create_user_table = schema.create_table_from_entity(User);
    let create_session_table = schema.create_table_from_entity(Session);
    let create_product_table = schema.create_table_from_entity(Product);
    let create_cart_table = schema.create_table_from_entity(Cart);
    let create_order_table = schema.create_table_from_entity(Order);
    let create_order_item_table = schema.create_table_from_entity(OrderItem);
    let create_profile_table = schema.create_table_from_entity(Profile);
    let create_image_table = schema.create_table_from_entity(Image);

    db.execute(db.get_database_backend().build(&create_user_table))
        .await
        .expect("Failed to create users schema");
    db.execute(db.get_database_backend().build(&create_session_table))
        .await
        .expect("Failed to create sessions schema");
    db.execute(db.get_database_backend().build(&create_product_table))
        .await
        .expect("Failed to create products schema");
    db.execute(db.get_database_backend().build(&create_cart_table))
        .await
        .expect("Failed to create cart schema");
    db.execute(db.get_database_backend().build(&create_order_table))
        .await
        .expect("Failed to create orders schema");
    db.execute(db.get_database_backend().build(&create_order_item_table))
        .await
        .expect("Failed to create order items schema");
    db.execute(db.get_database_backend().build(&create_profile_table))
        .await
        .expect("Failed to create profiles schema");
    db.execute(db.get_database_backend().build(&create_image_table))
        .await
        .expect("Failed to create images schema");
}

//Seeds one verified buyer and one verified seller so a fresh database is
//usable right away. Gated behind EKART_PRIMARY_SETUP.
pub async fn primary_setup(db: Arc<DatabaseConnection>) {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password("Secret15".as_bytes(), &salt)
        .expect("Failed to hash password")
        .to_string();

    let new_buyer = user::ActiveModel {
        username: Set("buyer".to_owned()),
        email: Set("buyer@ekart.dev".to_owned()),
        password: Set(password_hash.clone()),
        role: Set(user::Role::Buyer),
        is_verified: Set(true),
        ..Default::default()
    };

    let new_seller = user::ActiveModel {
        username: Set("seller".to_owned()),
        email: Set("seller@ekart.dev".to_owned()),
        password: Set(password_hash),
        role: Set(user::Role::Seller),
        is_verified: Set(true),
        ..Default::default()
    };

    match db.begin().await {
        Ok(txn) => {
            match user::Entity::insert_many([new_buyer, new_seller])
                .exec(&txn)
                .await
            {
                Ok(_) => match txn.commit().await {
                    Ok(_) => {}
                    Err(_) => {
                        panic!("Failed to run primary setup, but it was requested.");
                    }
                },
                Err(_) => {
                    let _ = txn.rollback().await;
                    panic!("Failed to run primary setup, but it was requested.");
                }
            }
        }
        Err(_) => {
            panic!("Failed to run primary setup, but it was requested.");
        }
    }
}
