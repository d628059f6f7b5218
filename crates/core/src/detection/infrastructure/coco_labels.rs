/// Class names of the 80-class COCO set, in model output order.
pub const COCO_LABELS: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Label for a class index, or a generic name for indices past the table.
pub fn label_for(class_id: usize) -> String {
    COCO_LABELS
        .get(class_id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("class {class_id}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_is_class_zero() {
        assert_eq!(label_for(0), crate::shared::constants::PERSON_LABEL);
    }

    #[test]
    fn test_out_of_range_index() {
        assert_eq!(label_for(80), "class 80");
        assert_eq!(label_for(79), "toothbrush");
    }
}
