use shared::domain::ClothingItem;

/// Wardrobe items named in the recommendation text, in wardrobe order.
pub fn match_recommended_items(recommendation: &str, wardrobe: &[ClothingItem]) -> Vec<ClothingItem> {
    let haystack = recommendation.to_lowercase();
    wardrobe
        .iter()
        .filter(|item| {
            let name = item.name.trim().to_lowercase();
            !name.is_empty() && haystack.contains(&name)
        })
        .cloned()
        .collect()
}
